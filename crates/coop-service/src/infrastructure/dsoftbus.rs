//! TCP implementation of the device-to-device session transport.
//!
//! # How a session is set up (for beginners)
//!
//! Every device runs one TCP listener.  To reach a peer, [`TcpSessionTransport`]
//! looks the peer's network id up in the configured peer table and spawns a
//! task that connects with a bounded timeout.  `open_session` returns as soon
//! as the task is spawned; packets sent meanwhile queue behind a
//! `DSOFTBUS_SESSION_BIND` packet carrying the local network id and session
//! name.  A failed connect is reported to observers as a shutdown.  The
//! accepting side reads that first packet to learn who is calling; a
//! connection whose first packet is anything else is dropped.
//!
//! After the bind, each session runs two tokio tasks:
//!
//! - a **writer** fed by an unbounded channel, so `send_packet` never blocks
//!   the cooperate worker;
//! - a **reader** that accumulates bytes in a buffer and decodes as many whole
//!   packets as it holds, handing each to the registered observers in order.
//!   Frames carrying an unknown message id are skipped, not fatal.
//!
//! Both ends may dial each other at the same moment.  The connection dialled
//! by the device with the smaller network id wins; the other is dropped
//! silently.
//!
//! TCP keep-alive (idle 10 s, 1 s interval, 5 probes) is applied to every
//! session socket so a vanished peer is noticed without protocol traffic.

use std::collections::BTreeMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use coop_core::protocol::codec::{
    decode_peer_message, encode_peer_message, PackHead, PACK_HEAD_SIZE,
};
use coop_core::protocol::messages::{session_name, DSoftbusSessionBind, PeerMessage};
use coop_core::{NetPacket, NetworkId, ProtocolError};
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::collaborators::{SessionObserver, SessionTransport};
use crate::application::error::TransportError;

const KEEPALIVE_IDLE: Duration = Duration::from_secs(10);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);
const KEEPALIVE_RETRIES: u32 = 5;

const READ_CHUNK: usize = 4096;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Static settings of the transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub local: NetworkId,
    /// `host:port` to listen on.  Port `0` picks a free port.
    pub bind_address: String,
    pub connect_timeout: Duration,
    /// Peer network id to `host:port`.
    pub peers: BTreeMap<NetworkId, String>,
}

struct Session {
    conn_id: u64,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    task: JoinHandle<()>,
}

/// State shared between the transport and its tasks.
struct Shared {
    local: NetworkId,
    sessions: Mutex<BTreeMap<NetworkId, Session>>,
    observers: Mutex<Vec<Weak<dyn SessionObserver>>>,
    next_conn_id: AtomicU64,
}

impl Shared {
    fn live_observers(&self) -> Vec<Arc<dyn SessionObserver>> {
        let mut observers = lock(&self.observers);
        observers.retain(|o| o.strong_count() > 0);
        observers.iter().filter_map(Weak::upgrade).collect()
    }

    fn dispatch(&self, peer: &NetworkId, packet: &NetPacket) {
        for observer in self.live_observers() {
            if observer.on_packet(peer, packet) {
                return;
            }
        }
        debug!("{:?} from {} not consumed", packet.msg_id(), peer.anonymized());
    }

    fn is_current(&self, peer: &NetworkId, conn_id: u64) -> bool {
        lock(&self.sessions)
            .get(peer)
            .map_or(false, |session| session.conn_id == conn_id)
    }

    /// Starts a dial to `peer`.  Outbound packets queue until the connection
    /// is up, the bind packet first.  Does nothing if a session exists.
    fn dial(
        self: &Arc<Self>,
        handle: &Handle,
        peer: NetworkId,
        addr: SocketAddr,
        connect_timeout: Duration,
        bind: Vec<u8>,
    ) {
        let mut sessions = lock(&self.sessions);
        if sessions.contains_key(&peer) {
            return;
        }
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (outbound, rx) = mpsc::unbounded_channel();
        let _ = outbound.send(bind);
        let shared = Arc::clone(self);
        let task_handle = handle.clone();
        let task_peer = peer.clone();
        // The entry is inserted before the lock is released, so the task
        // always finds its own session when it checks in.
        let task = handle.spawn(async move {
            match connect(addr, connect_timeout).await {
                Ok(stream) => {
                    run_session(shared, task_handle, task_peer, conn_id, stream, rx, Vec::new())
                        .await
                }
                Err(e) => {
                    warn!("connecting to {} failed: {e}", task_peer.anonymized());
                    shared.connection_lost(&task_peer, conn_id);
                }
            }
        });
        sessions.insert(
            peer,
            Session {
                conn_id,
                outbound,
                task,
            },
        );
    }

    /// Registers an accepted, bound connection.  Returns `false` when an
    /// existing session to the same peer wins the tie-break.
    fn accept(
        self: &Arc<Self>,
        handle: &Handle,
        peer: NetworkId,
        stream: TcpStream,
        pending: Vec<u8>,
    ) -> bool {
        let mut sessions = lock(&self.sessions);
        if sessions.contains_key(&peer) && self.local < peer {
            debug!("duplicate session with {} dropped", peer.anonymized());
            return false;
        }
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (outbound, rx) = mpsc::unbounded_channel();
        let task = handle.spawn(run_session(
            Arc::clone(self),
            handle.clone(),
            peer.clone(),
            conn_id,
            stream,
            rx,
            pending,
        ));
        if let Some(old) = sessions.insert(
            peer,
            Session {
                conn_id,
                outbound,
                task,
            },
        ) {
            old.task.abort();
        }
        true
    }

    /// Called by a session task that failed to connect, hit EOF or an error.
    fn connection_lost(&self, peer: &NetworkId, conn_id: u64) {
        let removed = {
            let mut sessions = lock(&self.sessions);
            match sessions.get(peer) {
                Some(session) if session.conn_id == conn_id => sessions.remove(peer).is_some(),
                _ => false,
            }
        };
        if removed {
            info!("session with {} shut down", peer.anonymized());
            for observer in self.live_observers() {
                observer.on_shutdown(peer);
            }
        }
    }
}

async fn connect(addr: SocketAddr, connect_timeout: Duration) -> std::io::Result<TcpStream> {
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))??;
    set_keepalive(SockRef::from(&stream));
    Ok(stream)
}

/// Pops one complete packet from the front of `buf`.  Frames with a message
/// id this build does not know are skipped whole.
fn take_packet(buf: &mut Vec<u8>) -> Result<Option<NetPacket>, ProtocolError> {
    loop {
        let head = match PackHead::decode(buf) {
            Ok(head) => head,
            Err(ProtocolError::InsufficientData { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let total = PACK_HEAD_SIZE + head.size;
        if buf.len() < total {
            return Ok(None);
        }
        let payload = buf[PACK_HEAD_SIZE..total].to_vec();
        buf.drain(..total);
        match NetPacket::from_parts(head, payload) {
            Ok(packet) => return Ok(Some(packet)),
            Err(ProtocolError::UnknownMessageType(id)) => {
                debug!("skipped frame with unknown message id {id}");
            }
            Err(e) => return Err(e),
        }
    }
}

async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
    peer: NetworkId,
) {
    while let Some(bytes) = rx.recv().await {
        if let Err(e) = write_half.write_all(&bytes).await {
            warn!("write to {} failed: {e}", peer.anonymized());
            break;
        }
    }
    let _ = write_half.shutdown().await;
}

/// Body of a connected session: start the writer, report the bind, then
/// read until the connection ends.
async fn run_session(
    shared: Arc<Shared>,
    handle: Handle,
    peer: NetworkId,
    conn_id: u64,
    stream: TcpStream,
    outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    pending: Vec<u8>,
) {
    if !shared.is_current(&peer, conn_id) {
        return;
    }
    let (read_half, write_half) = stream.into_split();
    handle.spawn(write_loop(write_half, outbound, peer.clone()));
    info!("session with {} bound", peer.anonymized());
    for observer in shared.live_observers() {
        observer.on_bind(&peer);
    }
    read_loop(read_half, pending, &peer, &shared).await;
    shared.connection_lost(&peer, conn_id);
}

async fn read_loop(
    mut read_half: OwnedReadHalf,
    mut recv_buf: Vec<u8>,
    peer: &NetworkId,
    shared: &Shared,
) {
    let mut read_tmp = vec![0u8; READ_CHUNK];
    loop {
        loop {
            match take_packet(&mut recv_buf) {
                Ok(Some(packet)) => shared.dispatch(peer, &packet),
                Ok(None) => break,
                Err(e) => {
                    warn!("decode error from {}: {e}", peer.anonymized());
                    return;
                }
            }
        }
        match read_half.read(&mut read_tmp).await {
            Ok(0) => {
                debug!("{} closed the connection", peer.anonymized());
                return;
            }
            Ok(n) => recv_buf.extend_from_slice(&read_tmp[..n]),
            Err(e) => {
                warn!("read from {} failed: {e}", peer.anonymized());
                return;
            }
        }
    }
}

/// Reads the first packet of an accepted connection; it must be a bind.
async fn read_bind(stream: &mut TcpStream) -> Result<(NetworkId, Vec<u8>), String> {
    let mut recv_buf = Vec::with_capacity(READ_CHUNK);
    let mut read_tmp = vec![0u8; READ_CHUNK];
    loop {
        if let Some(packet) = take_packet(&mut recv_buf).map_err(|e| e.to_string())? {
            return match decode_peer_message(&packet).map_err(|e| e.to_string())? {
                PeerMessage::SessionBind(bind) if bind.session_name == session_name(&bind.network_id) => {
                    Ok((bind.network_id, recv_buf))
                }
                PeerMessage::SessionBind(bind) => {
                    Err(format!("session name {:?} does not match its sender", bind.session_name))
                }
                other => Err(format!("expected a session bind, got {:?}", other.message_id())),
            };
        }
        let n = stream.read(&mut read_tmp).await.map_err(|e| e.to_string())?;
        if n == 0 {
            return Err("closed before binding".to_string());
        }
        recv_buf.extend_from_slice(&read_tmp[..n]);
    }
}

async fn accept_loop(
    listener: TcpListener,
    handle: Handle,
    shared: Arc<Shared>,
    bind_timeout: Duration,
) {
    loop {
        let (mut stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("accept failed: {e}");
                continue;
            }
        };
        set_keepalive(SockRef::from(&stream));
        let shared = Arc::clone(&shared);
        let task_handle = handle.clone();
        handle.spawn(async move {
            match tokio::time::timeout(bind_timeout, read_bind(&mut stream)).await {
                Ok(Ok((peer, pending))) => {
                    shared.accept(&task_handle, peer, stream, pending);
                }
                Ok(Err(reason)) => warn!("connection from {addr} rejected: {reason}"),
                Err(_) => warn!("connection from {addr} did not bind in time"),
            }
        });
    }
}

fn set_keepalive(socket: SockRef<'_>) {
    let keepalive = TcpKeepalive::new().with_time(KEEPALIVE_IDLE);
    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "windows"
    ))]
    let keepalive = keepalive.with_interval(KEEPALIVE_INTERVAL);
    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd"
    ))]
    let keepalive = keepalive.with_retries(KEEPALIVE_RETRIES);
    if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
        warn!("keep-alive not applied: {e}");
    }
}

// ── Transport ────────────────────────────────────────────────────────────────

pub struct TcpSessionTransport {
    handle: Handle,
    bind_address: String,
    connect_timeout: Duration,
    peers: Mutex<BTreeMap<NetworkId, String>>,
    shared: Arc<Shared>,
    listener: Mutex<Option<(SocketAddr, JoinHandle<()>)>>,
}

impl TcpSessionTransport {
    /// Creates a transport whose tasks run on `handle`.
    pub fn new(config: TransportConfig, handle: Handle) -> Self {
        Self {
            handle,
            bind_address: config.bind_address,
            connect_timeout: config.connect_timeout,
            peers: Mutex::new(config.peers),
            shared: Arc::new(Shared {
                local: config.local,
                sessions: Mutex::new(BTreeMap::new()),
                observers: Mutex::new(Vec::new()),
                next_conn_id: AtomicU64::new(0),
            }),
            listener: Mutex::new(None),
        }
    }

    /// Adds or replaces the address of a peer.
    pub fn add_peer(&self, network_id: NetworkId, address: impl Into<String>) {
        lock(&self.peers).insert(network_id, address.into());
    }

    /// The bound listener address, once enabled.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.listener).as_ref().map(|(addr, _)| *addr)
    }

    fn resolve(&self, network_id: &NetworkId) -> Result<SocketAddr, TransportError> {
        let address = lock(&self.peers)
            .get(network_id)
            .cloned()
            .ok_or_else(|| TransportError::UnknownPeer(network_id.anonymized()))?;
        address
            .to_socket_addrs()
            .map_err(|e| TransportError::open_failed(network_id, e))?
            .next()
            .ok_or_else(|| TransportError::open_failed(network_id, "address did not resolve"))
    }

    fn bind_packet(&self) -> Result<Vec<u8>, TransportError> {
        let local = self.shared.local.clone();
        let bind = PeerMessage::SessionBind(DSoftbusSessionBind {
            session_name: session_name(&local),
            network_id: local,
        });
        Ok(encode_peer_message(&bind).to_bytes()?)
    }
}

impl SessionTransport for TcpSessionTransport {
    fn enable(&self) -> Result<(), TransportError> {
        let mut listener_slot = lock(&self.listener);
        if listener_slot.is_some() {
            return Ok(());
        }
        let std_listener = std::net::TcpListener::bind(&self.bind_address)
            .map_err(|e| TransportError::BindFailed(format!("{}: {e}", self.bind_address)))?;
        std_listener
            .set_nonblocking(true)
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;
        let addr = std_listener
            .local_addr()
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;
        let listener = {
            let _guard = self.handle.enter();
            TcpListener::from_std(std_listener)
                .map_err(|e| TransportError::BindFailed(e.to_string()))?
        };
        let task = self.handle.spawn(accept_loop(
            listener,
            self.handle.clone(),
            Arc::clone(&self.shared),
            self.connect_timeout,
        ));
        info!(
            "listening on {addr} as {}",
            session_name(&self.shared.local)
        );
        *listener_slot = Some((addr, task));
        Ok(())
    }

    fn disable(&self) {
        let sessions = std::mem::take(&mut *lock(&self.shared.sessions));
        for (peer, session) in sessions {
            debug!("closing session with {}", peer.anonymized());
            session.task.abort();
        }
        if let Some((addr, task)) = lock(&self.listener).take() {
            task.abort();
            info!("listener on {addr} stopped");
        }
    }

    fn open_session(&self, network_id: &NetworkId) -> Result<(), TransportError> {
        if lock(&self.listener).is_none() {
            return Err(TransportError::NotEnabled);
        }
        if self.has_session(network_id) {
            return Ok(());
        }
        let addr = self.resolve(network_id)?;
        let bind = self.bind_packet()?;
        self.shared.dial(
            &self.handle,
            network_id.clone(),
            addr,
            self.connect_timeout,
            bind,
        );
        Ok(())
    }

    fn close_session(&self, network_id: &NetworkId) {
        if let Some(session) = lock(&self.shared.sessions).remove(network_id) {
            info!("session with {} closed", network_id.anonymized());
            session.task.abort();
        }
    }

    fn has_session(&self, network_id: &NetworkId) -> bool {
        lock(&self.shared.sessions).contains_key(network_id)
    }

    fn send_packet(&self, network_id: &NetworkId, packet: &NetPacket) -> Result<(), TransportError> {
        let bytes = packet.to_bytes()?;
        let sessions = lock(&self.shared.sessions);
        let session = sessions
            .get(network_id)
            .ok_or_else(|| TransportError::SessionNotFound(network_id.anonymized()))?;
        session
            .outbound
            .send(bytes)
            .map_err(|_| TransportError::send_failed(network_id, "session writer stopped"))
    }

    fn local_network_id(&self) -> NetworkId {
        self.shared.local.clone()
    }

    fn add_observer(&self, observer: Weak<dyn SessionObserver>) {
        lock(&self.shared.observers).push(observer);
    }

    fn remove_observer(&self, observer: &Weak<dyn SessionObserver>) {
        lock(&self.shared.observers).retain(|o| !Weak::ptr_eq(o, observer));
    }
}

impl Drop for TcpSessionTransport {
    fn drop(&mut self) {
        self.disable();
    }
}

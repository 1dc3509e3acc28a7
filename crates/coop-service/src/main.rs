//! `cooperated`: the cooperate daemon.
//!
//! Loads the TOML config, binds the session listener and runs the cooperate
//! worker until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()            -- generates and persists a network id on first run
//!  └─ Collaborators
//!       ├─ TcpSessionTransport (tokio tasks per peer session)
//!       ├─ TimerManager        (tokio tasks per timer)
//!       └─ headless adapters   (pointer state, configured peers)
//!  └─ Cooperate::new()         -- spawns the worker thread
//!  └─ CooperateServer          -- plugin facade; enable on start, disable on exit
//! ```

use std::sync::Arc;

use anyhow::Context as _;
use tokio::runtime::Handle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use coop_service::application::context::Collaborators;
use coop_service::application::cooperate::Cooperate;
use coop_service::application::error::RET_OK;
use coop_service::application::server::{marshal, CallingContext, CooperateServer, DefaultParam, IPlugin};
use coop_service::infrastructure::dsoftbus::TcpSessionTransport;
use coop_service::infrastructure::headless::{
    ConfiguredBoards, HeadlessInput, HeadlessProcessMonitor, LocalDeviceProfile, LoggingNotifier,
    StaticDeviceSource,
};
use coop_service::infrastructure::storage::config::{self, ServiceConfig};
use coop_service::infrastructure::timer::TimerManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (mut cfg, load_error) = match config::load_config() {
        Ok(cfg) => (cfg, None),
        Err(e) => (ServiceConfig::default(), Some(e)),
    };

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&cfg.service.log_level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Some(e) = load_error {
        warn!("config not loaded, using defaults: {e}");
    }
    if cfg.ensure_local_network_id() {
        if let Err(e) = config::save_config(&cfg) {
            warn!("generated network id not persisted: {e}");
        }
    }

    let handle = Handle::current();
    let transport = Arc::new(TcpSessionTransport::new(cfg.transport_config(), handle.clone()));
    let collaborators = Collaborators {
        input: Arc::new(HeadlessInput::new(cfg.display_info())),
        devices: Arc::new(StaticDeviceSource::default()),
        transport: transport.clone(),
        boards: Arc::new(ConfiguredBoards::new(cfg.peer_ids())),
        profiles: Arc::new(LocalDeviceProfile::default()),
        timers: Arc::new(TimerManager::new(handle)),
        notifier: Arc::new(LoggingNotifier),
        processes: Arc::new(HeadlessProcessMonitor),
    };

    let cooperate = Arc::new(
        Cooperate::new(collaborators, cfg.context_options()).context("starting cooperate worker")?,
    );
    let server = CooperateServer::new(Arc::clone(&cooperate));
    let caller = CallingContext {
        pid: std::process::id() as i32,
        ..CallingContext::default()
    };
    let param = marshal(&DefaultParam::default())?;

    let mut reply = Vec::new();
    if server.enable(&caller, &param, &mut reply).await != RET_OK {
        anyhow::bail!("cooperate could not be enabled");
    }
    match transport.local_addr() {
        Some(addr) => info!("cooperated ready on {addr}.  Press Ctrl-C to exit."),
        None => info!("cooperated ready.  Press Ctrl-C to exit."),
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received");

    if server.disable(&caller, &param, &mut reply).await != RET_OK {
        warn!("cooperate did not disable cleanly");
    }
    // Joining the worker blocks, so it happens off the async threads.
    drop(server);
    tokio::task::spawn_blocking(move || drop(cooperate))
        .await
        .context("stopping cooperate worker")?;

    info!("cooperated stopped");
    Ok(())
}

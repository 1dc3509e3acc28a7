//! Error types shared by the application layer and its collaborators.
//!
//! Every error that can reach an IPC caller is folded into [`CooperateError`],
//! which maps onto the integer status family returned across the IPC boundary
//! via [`CooperateError::code`].

use coop_core::{NetworkId, ProtocolError};
use thiserror::Error;

/// Success status.
pub const RET_OK: i32 = 0;
/// Generic failure status.
pub const RET_ERR: i32 = -1;
/// Status returned when an observer vetoes cooperation.
pub const COMMON_NOT_ALLOWED_DISTRIBUTED: i32 = 202;

/// Errors raised by the session transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is not enabled")]
    NotEnabled,
    #[error("no address configured for peer {0}")]
    UnknownPeer(String),
    #[error("failed to open session to {peer}: {reason}")]
    OpenFailed { peer: String, reason: String },
    #[error("no session to {0}")]
    SessionNotFound(String),
    #[error("failed to send to {peer}: {reason}")]
    SendFailed { peer: String, reason: String },
    #[error("failed to bind listener: {0}")]
    BindFailed(String),
    #[error("codec error: {0}")]
    Codec(#[from] ProtocolError),
}

impl TransportError {
    /// Builds an [`TransportError::OpenFailed`] with an anonymised peer id.
    pub fn open_failed(peer: &NetworkId, reason: impl ToString) -> Self {
        TransportError::OpenFailed {
            peer: peer.anonymized(),
            reason: reason.to_string(),
        }
    }

    pub fn send_failed(peer: &NetworkId, reason: impl ToString) -> Self {
        TransportError::SendFailed {
            peer: peer.anonymized(),
            reason: reason.to_string(),
        }
    }
}

/// Errors raised by the timer service.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    #[error("timer limit of {0} reached")]
    TooManyTimers(usize),
    #[error("timer {0} does not exist")]
    NotFound(i32),
    #[error("timer service is shut down")]
    ShutDown,
}

/// Errors raised by the input adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("input device {0} not found")]
    DeviceNotFound(i32),
    #[error("no display available")]
    NoDisplay,
    #[error("input platform error: {0}")]
    Platform(String),
}

/// The error type surfaced to cooperate API callers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CooperateError {
    /// An observer refused cooperation.
    #[error("cooperation is not allowed")]
    NotAllowed,
    /// Another handshake is already in flight.
    #[error("a cooperate request is already in progress")]
    Busy,
    /// The requested start device is unknown or not a pointer.
    #[error("invalid start device {0}")]
    InvalidDevice(i32),
    /// The request needs a peer but none is bound, or the id is empty.
    #[error("invalid network id")]
    InvalidNetworkId,
    /// The request is not valid in the current state.
    #[error("request not allowed in state {0}")]
    InvalidState(&'static str),
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("timer failure: {0}")]
    Timer(#[from] TimerError),
    #[error("input failure: {0}")]
    Input(#[from] InputError),
    /// The peer answered the handshake with `normal = false`.
    #[error("peer rejected the request")]
    Rejected,
    /// The handshake did not complete in time.
    #[error("request timed out")]
    Timeout,
    /// The request was dropped by a reset or shutdown.
    #[error("request cancelled")]
    Cancelled,
    /// The worker is not running.
    #[error("cooperate worker unavailable")]
    WorkerUnavailable,
    /// Parameter bytes could not be unmarshalled.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),
}

impl CooperateError {
    /// Maps the error onto the IPC status family.
    pub fn code(&self) -> i32 {
        match self {
            CooperateError::NotAllowed => COMMON_NOT_ALLOWED_DISTRIBUTED,
            _ => RET_ERR,
        }
    }
}

/// Converts a result into its IPC status code.
pub fn status_of<T>(result: &Result<T, CooperateError>) -> i32 {
    match result {
        Ok(_) => RET_OK,
        Err(e) => e.code(),
    }
}

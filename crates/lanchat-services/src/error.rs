//! Transfer lifecycle errors.

use std::net::SocketAddr;

use lanchat_core::WireError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("a transfer named {0:?} is already active")]
    Duplicate(String),

    /// The peer declined, either over UDP or at the TCP header stage.
    #[error("transfer rejected by peer")]
    Rejected,

    /// The worker observed a cancel flag.
    #[error("transfer cancelled")]
    Cancelled,

    #[error("checksum mismatch: received file does not match the declared digest")]
    ChecksumMismatch,

    #[error("connecting to {addr} timed out after {secs}s")]
    ConnectTimeout { addr: SocketAddr, secs: u64 },

    #[error("peer closed the connection after {received} of {expected} bytes")]
    PrematureEof { received: u64, expected: u64 },

    #[error("connection failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("invalid filename {0:?}")]
    InvalidFilename(String),

    #[error("no save path set for {0:?}")]
    NoSavePath(String),

    #[error("no pending offer named {0:?}")]
    UnknownOffer(String),

    #[error(transparent)]
    Wire(#[from] WireError),
}

impl TransferError {
    /// Whether this outcome is reported as a status change rather than an error.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

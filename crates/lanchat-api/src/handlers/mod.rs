//! HTTP API handlers — exposes node state and operations as JSON.

pub mod files;
pub mod messages;
pub mod status;

use std::fmt::Display;

use axum::http::StatusCode;

use lanchat_services::{Coordinator, TransferError};

use crate::event_log::EventLog;

#[derive(Clone)]
pub struct ApiState {
    pub node: Coordinator,
    pub events: EventLog,
}

// ── Shared helpers ────────────────────────────────────────────────────────────

type ApiError = (StatusCode, String);

fn bad_request(e: impl Display) -> ApiError {
    (StatusCode::BAD_REQUEST, e.to_string())
}

/// Map a node failure to a status code. Transfer errors the caller can fix
/// are client errors; everything else is a server error.
fn node_error(e: anyhow::Error) -> ApiError {
    let status = match e.downcast_ref::<TransferError>() {
        Some(TransferError::Duplicate(_)) => StatusCode::CONFLICT,
        Some(TransferError::NoSavePath(_) | TransferError::InvalidFilename(_)) => {
            StatusCode::BAD_REQUEST
        }
        Some(TransferError::Io(io)) if io.kind() == std::io::ErrorKind::NotFound => {
            StatusCode::NOT_FOUND
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, format!("{e:#}"))
}

// Re-export handler functions for use in router setup.
pub use files::{handle_cancel, handle_respond, handle_save_path, handle_send_file};
pub use messages::{handle_broadcast_presence, handle_send_message, handle_set_username};
pub use status::{handle_events, handle_peers, handle_status, handle_transfers};

//! Events surfaced to the UI collaborator.
//!
//! The network layer never calls into the UI. Every observable change is
//! published on an [`EventBus`] and the UI side subscribes.

use std::net::IpAddr;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::transfer_registry::{Operation, TransferStatus};

/// Capacity of the event channel. A subscriber that falls further behind
/// than this sees `RecvError::Lagged` and skips ahead.
const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NetEvent {
    PeerOnline {
        ip: IpAddr,
        username: String,
    },
    /// A known peer re-announced itself under a different name.
    PeerUpdated {
        ip: IpAddr,
        username: String,
    },
    PeerOffline {
        ip: IpAddr,
    },
    MessageReceived {
        sender: IpAddr,
        text: String,
    },
    FileRequestIncoming {
        sender: IpAddr,
        filename: String,
        size: u64,
        sender_name: String,
    },
    TransferProgress {
        filename: String,
        operation: Operation,
        percent: u8,
    },
    TransferStatus {
        filename: String,
        status: TransferStatus,
    },
    TransferComplete {
        filename: String,
        operation: Operation,
    },
    TransferError {
        filename: String,
        operation: Operation,
        message: String,
    },
    FileAccepted {
        filename: String,
        target: IpAddr,
    },
    FileRejected {
        filename: String,
        sender_name: String,
    },
}

/// Fan-out publisher for [`NetEvent`]s. Cheap to clone.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<NetEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: NetEvent) {
        tracing::trace!(?event, "event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NetEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

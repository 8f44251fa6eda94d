//! Transfer registry — active file transfers, their status, and the
//! cancel set.
//!
//! The filename is the transfer identity: at most one transfer per name is
//! active at a time. Status only moves forward
//! (Waiting → Transferring → Completed | Cancelled | Error) and every
//! accepted change is published on the event bus.

use std::net::IpAddr;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use lanchat_core::digest::Digest;

use crate::error::TransferError;
use crate::event::{EventBus, NetEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Send,
    Receive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Waiting,
    Transferring,
    Completed,
    Cancelled,
    Error,
}

impl TransferStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Waiting => 0,
            Self::Transferring => 1,
            Self::Completed | Self::Cancelled | Self::Error => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    /// Forward-only: a transition must strictly advance the rank.
    pub fn can_advance_to(self, next: TransferStatus) -> bool {
        next.rank() > self.rank()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub filename: String,
    pub size: u64,
    pub digest: Digest,
    pub operation: Operation,
    pub status: TransferStatus,
    pub peer: IpAddr,
    /// Last progress value reported, if any.
    pub percent: Option<u8>,
}

#[derive(Clone)]
pub struct TransferRegistry {
    records: Arc<DashMap<String, TransferRecord>>,
    cancels: Arc<DashSet<String>>,
    /// Wakes a worker parked on socket I/O when its cancel flag is set.
    signals: Arc<DashMap<String, Arc<Notify>>>,
    events: EventBus,
}

impl TransferRegistry {
    pub fn new(events: EventBus) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            cancels: Arc::new(DashSet::new()),
            signals: Arc::new(DashMap::new()),
            events,
        }
    }

    /// Register a new transfer in `Waiting`.
    pub fn begin(
        &self,
        filename: &str,
        size: u64,
        digest: Digest,
        operation: Operation,
        peer: IpAddr,
    ) -> Result<(), TransferError> {
        match self.records.entry(filename.to_string()) {
            Entry::Occupied(_) => return Err(TransferError::Duplicate(filename.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(TransferRecord {
                    filename: filename.to_string(),
                    size,
                    digest,
                    operation,
                    status: TransferStatus::Waiting,
                    peer,
                    percent: None,
                });
            }
        }
        tracing::debug!(filename, size, ?operation, peer = %peer, "transfer registered");
        self.events.emit(NetEvent::TransferStatus {
            filename: filename.to_string(),
            status: TransferStatus::Waiting,
        });
        Ok(())
    }

    /// Move a transfer to `next`. Returns false (and publishes nothing) if
    /// the transfer is unknown or the move would go backwards.
    pub fn transition(&self, filename: &str, next: TransferStatus) -> bool {
        {
            let Some(mut record) = self.records.get_mut(filename) else {
                return false;
            };
            if !record.status.can_advance_to(next) {
                tracing::debug!(
                    filename,
                    from = ?record.status,
                    to = ?next,
                    "ignoring backward status transition"
                );
                return false;
            }
            record.status = next;
        }
        self.events.emit(NetEvent::TransferStatus {
            filename: filename.to_string(),
            status: next,
        });
        true
    }

    /// Publish progress. Values are clamped to 100 and never go down; a
    /// repeat of the last value is not republished.
    pub fn report_progress(&self, filename: &str, percent: u8) {
        let percent = percent.min(100);
        let operation = {
            let Some(mut record) = self.records.get_mut(filename) else {
                return;
            };
            if record.percent.is_some_and(|last| last >= percent) {
                return;
            }
            record.percent = Some(percent);
            record.operation
        };
        self.events.emit(NetEvent::TransferProgress {
            filename: filename.to_string(),
            operation,
            percent,
        });
    }

    /// Flag an active transfer for cancellation. Idempotent. Returns false
    /// when no transfer by that name is active; no flag is left behind then.
    pub fn request_cancel(&self, filename: &str) -> bool {
        // The record guard is held across the insert so `finish` cannot
        // slip in between and leave a stale flag.
        let Some(_record) = self.records.get(filename) else {
            return false;
        };
        self.cancels.insert(filename.to_string());
        if let Some(signal) = self.signals.get(filename) {
            signal.notify_one();
        }
        true
    }

    /// Resolves once a cancel is requested for `filename`, consuming the
    /// flag. Dropping the future before then leaves the flag untouched.
    pub async fn cancelled(&self, filename: &str) {
        let signal = self
            .signals
            .entry(filename.to_string())
            .or_default()
            .clone();
        loop {
            if self.take_cancel(filename) {
                return;
            }
            signal.notified().await;
        }
    }

    /// Consume the cancel flag if set. Only the observing worker calls this.
    pub fn take_cancel(&self, filename: &str) -> bool {
        self.cancels.remove(filename).is_some()
    }

    pub fn is_cancel_requested(&self, filename: &str) -> bool {
        self.cancels.contains(filename)
    }

    /// Drop the record and any residual cancel flag.
    pub fn finish(&self, filename: &str) -> Option<TransferRecord> {
        let record = self.records.remove(filename).map(|(_, r)| r);
        self.cancels.remove(filename);
        self.signals.remove(filename);
        record
    }

    pub fn get(&self, filename: &str) -> Option<TransferRecord> {
        self.records.get(filename).map(|r| r.clone())
    }

    /// Snapshot of all active transfers, ordered by filename.
    pub fn snapshot(&self) -> Vec<TransferRecord> {
        let mut all: Vec<TransferRecord> = self.records.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| a.filename.cmp(&b.filename));
        all
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn pending_cancels(&self) -> usize {
        self.cancels.len()
    }
}

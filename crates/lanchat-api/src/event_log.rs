//! Bounded in-memory event log, so HTTP clients can poll for events.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};

use lanchat_services::NetEvent;

/// Events kept for polling. Older entries are dropped first.
pub const LOG_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize)]
pub struct LoggedEvent {
    pub seq: u64,
    #[serde(flatten)]
    pub event: NetEvent,
}

#[derive(Clone, Default)]
pub struct EventLog {
    inner: Arc<Mutex<LogInner>>,
}

#[derive(Default)]
struct LogInner {
    entries: VecDeque<LoggedEvent>,
    next_seq: u64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and return its sequence number (starting at 1).
    pub fn push(&self, event: NetEvent) -> u64 {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.next_seq += 1;
        let seq = inner.next_seq;
        if inner.entries.len() == LOG_CAPACITY {
            inner.entries.pop_front();
        }
        inner.entries.push_back(LoggedEvent { seq, event });
        seq
    }

    /// Every retained event with a sequence number above `since`.
    pub fn since(&self, since: u64) -> Vec<LoggedEvent> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .entries
            .iter()
            .filter(|e| e.seq > since)
            .cloned()
            .collect()
    }

    /// Sequence number of the newest event, 0 when none has been logged.
    pub fn last_seq(&self) -> u64 {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).next_seq
    }

    /// Drain `rx` into the log until the bus closes.
    pub fn spawn_collector(&self, mut rx: broadcast::Receiver<NetEvent>) -> tokio::task::JoinHandle<()> {
        let log = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        log.push(event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event log fell behind");
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        })
    }
}

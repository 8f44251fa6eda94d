//! Save-path bindings for inbound transfers.
//!
//! A file request arrives before the user has chosen where to store it.
//! The UI binds a destination, then accepts; accepting arms the binding
//! for the requesting peer's address. The TCP side only writes to disk
//! for a connection that matches an armed binding.
//!
//! An armed binding lives for the accept window only. A sender that
//! withdraws or never connects leaves nothing behind once it lapses.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug, Clone)]
struct Acceptance {
    peer: IpAddr,
    until: Instant,
}

#[derive(Debug, Clone)]
struct Binding {
    path: PathBuf,
    accepted: Option<Acceptance>,
}

#[derive(Clone)]
pub struct SavePathBindings {
    inner: Arc<DashMap<String, Binding>>,
    window: Duration,
}

impl SavePathBindings {
    /// `window` is how long an armed binding waits for its connection.
    pub fn new(window: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            window,
        }
    }

    /// Bind (or rebind) a destination. An existing acceptance is kept.
    pub fn set(&self, filename: &str, path: PathBuf) {
        self.inner
            .entry(filename.to_string())
            .and_modify(|b| b.path = path.clone())
            .or_insert(Binding {
                path,
                accepted: None,
            });
    }

    /// Mark the binding accepted for `peer`. False if nothing is bound.
    pub fn arm(&self, filename: &str, peer: IpAddr) -> bool {
        match self.inner.get_mut(filename) {
            Some(mut b) => {
                b.accepted = Some(Acceptance {
                    peer,
                    until: Instant::now() + self.window,
                });
                true
            }
            None => false,
        }
    }

    /// Consume the binding for an inbound connection from `peer`. Only an
    /// armed, unexpired binding for that same peer yields a path.
    pub fn claim(&self, filename: &str, peer: IpAddr) -> Option<PathBuf> {
        let now = Instant::now();
        self.inner
            .remove_if(filename, |_, b| {
                b.accepted
                    .as_ref()
                    .is_some_and(|a| a.peer == peer && now < a.until)
            })
            .map(|(_, b)| b.path)
    }

    /// Drop armed bindings whose window closed before `now`. Returns their
    /// filenames.
    pub fn sweep(&self, now: Instant) -> Vec<String> {
        let mut expired = Vec::new();
        self.inner.retain(|name, b| {
            let lapsed = b.accepted.as_ref().is_some_and(|a| a.until <= now);
            if lapsed {
                expired.push(name.clone());
            }
            !lapsed
        });
        expired
    }

    pub fn clear(&self, filename: &str) -> bool {
        self.inner.remove(filename).is_some()
    }

    pub fn is_armed(&self, filename: &str) -> bool {
        self.inner
            .get(filename)
            .is_some_and(|b| b.accepted.is_some())
    }

    pub fn path_of(&self, filename: &str) -> Option<PathBuf> {
        self.inner.get(filename).map(|b| b.path.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

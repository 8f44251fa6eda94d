//! Presence registry — tracks nearby peers and their liveness.
//!
//! Populated by the discovery receive path, pruned by the heartbeat sweep.
//! Both run on the discovery task; reads (peer listing, rejecter names)
//! come from anywhere.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Tracked state for a discovered peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Source address of the presence datagram.
    pub ip: IpAddr,
    /// Display name from the latest presence datagram.
    pub username: String,
    /// When the latest presence datagram arrived.
    pub last_seen: Instant,
}

/// What a presence datagram did to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceChange {
    /// First sight of this peer.
    Online,
    /// Known peer, same name; only the liveness timestamp moved.
    Refreshed,
    /// Known peer announcing a new name.
    Renamed { previous: String },
}

/// The peer table, keyed on address. Cheap to clone.
#[derive(Clone)]
pub struct PresenceRegistry {
    peers: Arc<DashMap<IpAddr, Peer>>,
    ttl: Duration,
}

impl PresenceRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            peers: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Record a presence datagram received now.
    pub fn record_presence(&self, ip: IpAddr, username: &str) -> PresenceChange {
        self.record_presence_at(ip, username, Instant::now())
    }

    /// Record a presence datagram received at `now`.
    pub fn record_presence_at(&self, ip: IpAddr, username: &str, now: Instant) -> PresenceChange {
        match self.peers.entry(ip) {
            Entry::Vacant(slot) => {
                slot.insert(Peer {
                    ip,
                    username: username.to_string(),
                    last_seen: now,
                });
                PresenceChange::Online
            }
            Entry::Occupied(mut slot) => {
                let peer = slot.get_mut();
                peer.last_seen = now;
                if peer.username == username {
                    PresenceChange::Refreshed
                } else {
                    let previous = std::mem::replace(&mut peer.username, username.to_string());
                    PresenceChange::Renamed { previous }
                }
            }
        }
    }

    /// Remove every peer silent for longer than the TTL. Returns the
    /// removed addresses; each removal is reported exactly once.
    pub fn sweep(&self, now: Instant) -> Vec<IpAddr> {
        let mut removed = Vec::new();
        self.peers.retain(|ip, peer| {
            let alive = now.saturating_duration_since(peer.last_seen) <= self.ttl;
            if !alive {
                removed.push(*ip);
            }
            alive
        });
        removed
    }

    pub fn get(&self, ip: &IpAddr) -> Option<Peer> {
        self.peers.get(ip).map(|p| p.clone())
    }

    pub fn username_of(&self, ip: &IpAddr) -> Option<String> {
        self.peers.get(ip).map(|p| p.username.clone())
    }

    /// Snapshot of all peers, ordered by address.
    pub fn peers(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self.peers.iter().map(|p| p.value().clone()).collect();
        peers.sort_by_key(|p| p.ip);
        peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

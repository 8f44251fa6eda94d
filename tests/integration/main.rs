//! Lanchat integration test harness.
//!
//! Every test runs whole nodes in-process on 127.0.0.1 with OS-assigned
//! ports. Each node is pointed at its partner's ports, and presence goes
//! to 127.0.0.1 instead of the LAN broadcast address.
//!
//!   cargo test --test integration

mod failures;
mod messaging;
mod presence;

use std::collections::HashSet;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::broadcast;

use lanchat_core::LanchatConfig;
use lanchat_services::{Coordinator, NetEvent};

// ── Harness ───────────────────────────────────────────────────────────────────

pub const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// How long any single expected event may take.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(20);

pub struct Node {
    pub node: Coordinator,
    pub events: broadcast::Receiver<NetEvent>,
    shutdown: broadcast::Sender<()>,
}

impl Node {
    /// Bind a node on loopback. Call [`Node::start`] once its peer ports
    /// are set.
    pub async fn bind(username: &str, heartbeat_secs: u64, peer_ttl_secs: u64) -> Result<Self> {
        let mut config = LanchatConfig::default();
        config.identity.username = username.to_string();
        config.network.bind_addr = LOCALHOST;
        config.network.udp_port = 0;
        config.network.tcp_port = 0;
        config.network.broadcast_addrs = vec![Ipv4Addr::LOCALHOST];
        config.discovery.heartbeat_secs = heartbeat_secs;
        config.discovery.peer_ttl_secs = peer_ttl_secs;
        config.transfer.connect_timeout_secs = 5;
        config.transfer.accept_window_secs = 5;
        config.transfer.download_dir = scratch(&format!("downloads-{username}"));

        let node = Coordinator::bind(config, HashSet::new()).await?;
        let events = node.subscribe();
        let (shutdown, _) = broadcast::channel(1);
        Ok(Self {
            node,
            events,
            shutdown,
        })
    }

    pub fn start(&self) {
        let node = self.node.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = node.run(shutdown).await {
                eprintln!("node exited: {e:#}");
            }
        });
    }

    pub fn stop(&self) {
        let _ = self.shutdown.send(());
    }

    /// Wait for the first event matching `pred`, skipping others.
    pub async fn expect<F>(&mut self, what: &str, mut pred: F) -> Result<NetEvent>
    where
        F: FnMut(&NetEvent) -> bool,
    {
        let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
        loop {
            let event = tokio::time::timeout_at(deadline, self.events.recv())
                .await
                .with_context(|| format!("timed out waiting for {what}"))?
                .with_context(|| format!("event bus failed while waiting for {what}"))?;
            if pred(&event) {
                return Ok(event);
            }
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Two started nodes that see each other.
pub async fn pair(a: &str, b: &str) -> Result<(Node, Node)> {
    pair_with(a, b, 3600, 3600).await
}

pub async fn pair_with(a: &str, b: &str, heartbeat_secs: u64, ttl_secs: u64) -> Result<(Node, Node)> {
    let mut a = Node::bind(a, heartbeat_secs, ttl_secs).await?;
    let mut b = Node::bind(b, heartbeat_secs, ttl_secs).await?;
    a.node.set_peer_ports(b.node.udp_port(), b.node.tcp_port());
    b.node.set_peer_ports(a.node.udp_port(), a.node.tcp_port());
    a.start();
    b.start();

    a.expect("partner presence", |e| matches!(e, NetEvent::PeerOnline { .. }))
        .await?;
    b.expect("partner presence", |e| matches!(e, NetEvent::PeerOnline { .. }))
        .await?;
    Ok((a, b))
}

/// Poll `check` until it holds.
pub async fn eventually<F, Fut>(what: &str, mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    bail!("condition never held: {what}")
}

/// A fresh scratch directory, unique within the test run.
pub fn scratch(tag: &str) -> PathBuf {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    let n = NEXT.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("lanchat-it-{}-{n}-{tag}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("scratch dir");
    dir
}

/// Write `len` bytes of a repeating non-trivial pattern.
pub fn write_pattern(path: &Path, len: usize) -> Vec<u8> {
    let data: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();
    std::fs::write(path, &data).expect("write source file");
    data
}

pub fn md5_of(data: &[u8]) -> [u8; 16] {
    lanchat_core::digest::md5(data)
}

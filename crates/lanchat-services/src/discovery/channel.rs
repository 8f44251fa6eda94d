//! UDP discovery channel — presence broadcast, chat, and handshake control.
//!
//! One socket serves both directions. The receive side decodes and filters
//! datagrams; dispatching them is the coordinator's job.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use lanchat_core::wire::MAX_DATAGRAM_LEN;
use lanchat_core::{Datagram, WireError};

use super::interfaces;

/// A datagram that passed decoding and identity filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub sender: IpAddr,
    pub datagram: Datagram,
}

#[derive(Clone)]
pub struct DiscoveryChannel {
    socket: Arc<UdpSocket>,
    peer_port: Arc<AtomicU16>,
    local_addrs: Arc<HashSet<IpAddr>>,
    /// Fixed presence destinations. Empty = enumerate interfaces per broadcast.
    broadcast_addrs: Arc<Vec<Ipv4Addr>>,
}

impl DiscoveryChannel {
    /// Bind the discovery socket.
    ///
    /// `local_addrs` are this host's own addresses; datagrams from them are
    /// dropped on receipt.
    pub fn bind(
        bind_addr: SocketAddr,
        peer_port: u16,
        local_addrs: HashSet<IpAddr>,
        broadcast_addrs: Vec<Ipv4Addr>,
    ) -> Result<Self> {
        let socket = make_socket(bind_addr).context("failed to create discovery socket")?;
        let socket = UdpSocket::from_std(socket.into())
            .context("failed to convert to tokio UdpSocket")?;

        tracing::info!(
            addr = %socket.local_addr()?,
            peer_port,
            local_addrs = local_addrs.len(),
            "discovery channel bound"
        );

        Ok(Self {
            socket: Arc::new(socket),
            peer_port: Arc::new(AtomicU16::new(peer_port)),
            local_addrs: Arc::new(local_addrs),
            broadcast_addrs: Arc::new(broadcast_addrs),
        })
    }

    pub fn local_port(&self) -> std::io::Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    /// Port datagrams are addressed to on peers.
    pub fn peer_port(&self) -> u16 {
        self.peer_port.load(Ordering::Relaxed)
    }

    pub fn set_peer_port(&self, port: u16) {
        self.peer_port.store(port, Ordering::Relaxed);
    }

    // ── Send path ─────────────────────────────────────────────────────────────

    /// Unicast one datagram to a peer.
    pub async fn send_to(&self, datagram: &Datagram, target: IpAddr) -> Result<()> {
        let bytes = datagram.encode()?;
        let dest = SocketAddr::new(target, self.peer_port());
        self.socket
            .send_to(&bytes, dest)
            .await
            .with_context(|| format!("failed to send {} to {dest}", datagram.kind()))?;
        tracing::trace!(kind = datagram.kind(), dest = %dest, bytes = bytes.len(), "datagram sent");
        Ok(())
    }

    /// Announce `username` on every broadcast destination. Returns how many
    /// destinations the datagram reached; per-destination failures are logged.
    pub async fn broadcast_presence(&self, username: &str) -> Result<usize> {
        let bytes = Datagram::presence(username).encode()?;
        let targets = if self.broadcast_addrs.is_empty() {
            interfaces::broadcast_targets()
        } else {
            self.broadcast_addrs.as_ref().clone()
        };

        let mut sent = 0;
        for target in targets {
            let dest = SocketAddr::new(IpAddr::V4(target), self.peer_port());
            match self.socket.send_to(&bytes, dest).await {
                Ok(_) => sent += 1,
                Err(e) => tracing::warn!(dest = %dest, error = %e, "presence broadcast failed"),
            }
        }
        tracing::trace!(sent, username, "presence broadcast");
        Ok(sent)
    }

    pub async fn send_message(&self, text: &str, target: IpAddr) -> Result<()> {
        self.send_to(
            &Datagram::Message {
                content: text.to_string(),
            },
            target,
        )
        .await
    }

    pub async fn send_file_request(
        &self,
        filename: &str,
        size: u64,
        file_port: u16,
        sender_name: &str,
        target: IpAddr,
    ) -> Result<()> {
        self.send_to(
            &Datagram::FileRequest {
                filename: filename.to_string(),
                size,
                port: Some(file_port),
                sender: sender_name.to_string(),
            },
            target,
        )
        .await
    }

    pub async fn send_file_response(
        &self,
        filename: &str,
        target: IpAddr,
        accepted: bool,
    ) -> Result<()> {
        self.send_to(
            &Datagram::FileResponse {
                filename: filename.to_string(),
                accepted,
            },
            target,
        )
        .await
    }

    // ── Receive path ──────────────────────────────────────────────────────────

    /// Wait for the next datagram. `Ok(None)` means one arrived but was
    /// dropped by decoding or filtering.
    pub async fn recv(&self, buf: &mut [u8]) -> std::io::Result<Option<Inbound>> {
        let (len, from) = self.socket.recv_from(buf).await?;
        Ok(self.accept(&buf[..len], from))
    }

    /// Decode and filter one datagram.
    pub fn accept(&self, bytes: &[u8], from: SocketAddr) -> Option<Inbound> {
        let sender = from.ip().to_canonical();

        let datagram = match Datagram::decode(bytes) {
            Ok(d) => d,
            Err(WireError::ForeignApp) => {
                tracing::trace!(from = %from, "ignoring foreign datagram");
                return None;
            }
            Err(WireError::UnknownType(kind)) => {
                tracing::debug!(from = %from, kind, "ignoring unknown datagram type");
                return None;
            }
            Err(e) => {
                tracing::trace!(from = %from, error = %e, "dropping malformed datagram");
                return None;
            }
        };

        if self.local_addrs.contains(&sender) {
            tracing::trace!(from = %from, kind = datagram.kind(), "ignoring own datagram");
            return None;
        }

        Some(Inbound { sender, datagram })
    }
}

/// Receive buffer large enough for any UDP datagram.
pub fn recv_buffer() -> Vec<u8> {
    vec![0u8; MAX_DATAGRAM_LEN + 28]
}

/// Create a broadcast-capable UDP socket bound to `bind_addr`.
fn make_socket(bind_addr: SocketAddr) -> Result<Socket> {
    let socket = Socket::new(Domain::for_address(bind_addr), Type::DGRAM, Some(Protocol::UDP))
        .context("socket()")?;

    socket.set_reuse_address(true).context("SO_REUSEADDR")?;
    socket.set_broadcast(true).context("SO_BROADCAST")?;
    socket.set_nonblocking(true).context("set_nonblocking")?;
    socket
        .bind(&bind_addr.into())
        .with_context(|| format!("bind({bind_addr})"))?;

    Ok(socket)
}

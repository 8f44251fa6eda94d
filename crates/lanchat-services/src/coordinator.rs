//! Coordinator — owns the sockets and registries and runs the node.
//!
//! The UI side only talks to a [`Coordinator`]: it calls the methods below
//! and consumes [`NetEvent`]s from [`Coordinator::subscribe`].

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use lanchat_core::{Datagram, LanchatConfig};

use crate::backoff::Backoff;
use crate::bindings::SavePathBindings;
use crate::discovery::{recv_buffer, DiscoveryChannel, Inbound};
use crate::error::TransferError;
use crate::event::{EventBus, NetEvent};
use crate::file_transfer::{FileOffer, FileTransferService};
use crate::presence::{Peer, PresenceChange, PresenceRegistry};
use crate::transfer_registry::{TransferRecord, TransferRegistry};

#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    config: LanchatConfig,
    username: RwLock<String>,
    events: EventBus,
    presence: PresenceRegistry,
    discovery: DiscoveryChannel,
    files: FileTransferService,
    /// Taken by `run`; present until then.
    listener: Mutex<Option<TcpListener>>,
    tcp_port: u16,
}

impl Coordinator {
    /// Bind both sockets. `local_addrs` are this host's own addresses.
    pub async fn bind(config: LanchatConfig, local_addrs: HashSet<IpAddr>) -> Result<Self> {
        let net = &config.network;
        let events = EventBus::new();
        let presence = PresenceRegistry::new(config.discovery.peer_ttl());

        let discovery = DiscoveryChannel::bind(
            SocketAddr::new(net.bind_addr, net.udp_port),
            net.effective_peer_udp_port(),
            local_addrs,
            net.broadcast_addrs.clone(),
        )?;

        let tcp_addr = SocketAddr::new(net.bind_addr, net.tcp_port);
        let listener = TcpListener::bind(tcp_addr)
            .await
            .with_context(|| format!("failed to bind file listener on {tcp_addr}"))?;
        let tcp_port = listener.local_addr()?.port();

        let files = FileTransferService::new(
            TransferRegistry::new(events.clone()),
            SavePathBindings::new(config.transfer.accept_window()),
            presence.clone(),
            events.clone(),
            net.effective_peer_tcp_port(),
            config.transfer.connect_timeout(),
        );

        tracing::info!(
            username = %config.identity.username,
            udp_port = discovery.local_port()?,
            tcp_port,
            "node bound"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                username: RwLock::new(config.identity.username.clone()),
                config,
                events,
                presence,
                discovery,
                files,
                listener: Mutex::new(Some(listener)),
                tcp_port,
            }),
        })
    }

    pub fn config(&self) -> &LanchatConfig {
        &self.inner.config
    }

    pub fn udp_port(&self) -> u16 {
        self.inner.discovery.local_port().unwrap_or(0)
    }

    pub fn tcp_port(&self) -> u16 {
        self.inner.tcp_port
    }

    /// Point this node at peers listening on non-default ports.
    pub fn set_peer_ports(&self, udp: u16, tcp: u16) {
        self.inner.discovery.set_peer_port(udp);
        self.inner.files.set_peer_port(tcp);
    }

    // ── Calls from the UI ────────────────────────────────────────────────────

    pub fn username(&self) -> String {
        self.inner
            .username
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Change the display name and announce it right away.
    pub async fn set_username(&self, name: &str) -> Result<()> {
        *self
            .inner
            .username
            .write()
            .unwrap_or_else(|e| e.into_inner()) = name.to_string();
        tracing::info!(username = name, "username changed");
        self.broadcast_presence_now().await
    }

    pub async fn broadcast_presence_now(&self) -> Result<()> {
        let sent = self
            .inner
            .discovery
            .broadcast_presence(&self.username())
            .await?;
        if sent == 0 {
            anyhow::bail!("presence reached no broadcast destination");
        }
        Ok(())
    }

    pub async fn send_message(&self, text: &str, target: IpAddr) -> Result<()> {
        self.inner.discovery.send_message(text, target).await
    }

    /// Offer a local file to `target`. The transfer starts once the peer
    /// accepts.
    pub async fn request_file_send(&self, path: &Path, target: IpAddr) -> Result<FileOffer> {
        let offer = self.inner.files.offer(path, target).await?;
        let sent = self
            .inner
            .discovery
            .send_file_request(
                &offer.filename,
                offer.size,
                self.inner.tcp_port,
                &self.username(),
                target,
            )
            .await;
        if let Err(e) = sent {
            self.inner.files.withdraw(
                &offer.filename,
                TransferError::Protocol(format!("file request not sent: {e:#}")),
            );
            return Err(e);
        }
        Ok(offer)
    }

    /// Answer a peer's file request. Accepting needs a save path bound
    /// first; without one the request is declined and an error returned.
    pub async fn respond_to_file_request(
        &self,
        filename: &str,
        target: IpAddr,
        accepted: bool,
    ) -> Result<()> {
        let files = &self.inner.files;
        let accepted = if accepted {
            match files.accept_incoming(filename, target) {
                Ok(()) => true,
                Err(e) => {
                    files.decline_incoming(filename);
                    self.inner
                        .discovery
                        .send_file_response(filename, target, false)
                        .await?;
                    return Err(e.into());
                }
            }
        } else {
            files.decline_incoming(filename);
            false
        };
        self.inner
            .discovery
            .send_file_response(filename, target, accepted)
            .await
    }

    pub fn set_save_path(&self, filename: &str, path: PathBuf) {
        self.inner.files.set_save_path(filename, path);
    }

    /// Returns false when nothing under `filename` was active.
    pub fn cancel_transfer(&self, filename: &str) -> bool {
        self.inner.files.cancel(filename)
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    pub fn peers(&self) -> Vec<Peer> {
        self.inner.presence.peers()
    }

    pub fn transfers(&self) -> Vec<TransferRecord> {
        self.inner.files.registry().snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NetEvent> {
        self.inner.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn files(&self) -> &FileTransferService {
        &self.inner.files
    }

    // ── Tasks ────────────────────────────────────────────────────────────────

    /// Run discovery and the file listener until `shutdown` fires.
    pub async fn run(self, shutdown: broadcast::Sender<()>) -> Result<()> {
        let listener = self
            .inner
            .listener
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .context("coordinator is already running")?;

        let accept_task = tokio::spawn(
            self.inner
                .files
                .clone()
                .accept_loop(listener, shutdown.subscribe()),
        );

        self.discovery_loop(shutdown.subscribe()).await;
        let _ = accept_task.await;
        Ok(())
    }

    /// Receive datagrams and tick the heartbeat. One task owns both so
    /// presence records and sweeps never race.
    async fn discovery_loop(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut heartbeat = tokio::time::interval(self.inner.config.discovery.heartbeat());
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut backoff = Backoff::new();
        let mut buf = recv_buffer();

        tracing::info!(
            heartbeat_secs = self.inner.config.discovery.heartbeat_secs,
            "discovery starting"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("discovery shutting down");
                    return;
                }
                // First tick fires immediately: the startup announcement.
                _ = heartbeat.tick() => self.heartbeat().await,
                received = self.inner.discovery.recv(&mut buf) => match received {
                    Ok(Some(inbound)) => {
                        backoff.reset();
                        self.dispatch(inbound);
                    }
                    Ok(None) => backoff.reset(),
                    Err(e) => {
                        let delay = backoff.next_delay();
                        tracing::warn!(error = %e, retry_ms = delay.as_millis() as u64, "recv_from failed");
                        tokio::time::sleep(delay).await;
                    }
                },
            }
        }
    }

    async fn heartbeat(&self) {
        if let Err(e) = self.broadcast_presence_now().await {
            tracing::warn!(error = %e, "presence broadcast failed");
        }
        for ip in self.inner.presence.sweep(Instant::now()) {
            tracing::info!(peer = %ip, "peer offline");
            self.inner.events.emit(NetEvent::PeerOffline { ip });
        }
    }

    fn dispatch(&self, inbound: Inbound) {
        let Inbound { sender, datagram } = inbound;
        let events = &self.inner.events;
        match datagram {
            Datagram::Message { content } => {
                tracing::debug!(from = %sender, len = content.len(), "message received");
                events.emit(NetEvent::MessageReceived {
                    sender,
                    text: content,
                });
            }
            Datagram::Presence { username, .. } => {
                match self.inner.presence.record_presence(sender, &username) {
                    PresenceChange::Online => {
                        tracing::info!(peer = %sender, username, "peer online");
                        events.emit(NetEvent::PeerOnline {
                            ip: sender,
                            username,
                        });
                    }
                    PresenceChange::Renamed { previous } => {
                        tracing::info!(peer = %sender, previous, username, "peer renamed");
                        events.emit(NetEvent::PeerUpdated {
                            ip: sender,
                            username,
                        });
                    }
                    PresenceChange::Refreshed => {}
                }
            }
            Datagram::FileRequest {
                filename,
                size,
                sender: sender_name,
                ..
            } => {
                tracing::info!(from = %sender, filename, size, "file request received");
                events.emit(NetEvent::FileRequestIncoming {
                    sender,
                    filename,
                    size,
                    sender_name,
                });
            }
            Datagram::FileResponse { filename, accepted } => {
                tracing::debug!(from = %sender, filename, accepted, "file response received");
                self.inner.files.handle_response(&filename, sender, accepted);
            }
        }
    }
}

//! File transfer — offer/accept handshake and the TCP data channel.
//!
//! The handshake runs over the discovery channel (`file_request` /
//! `file_response`); the data runs over a dedicated TCP connection opened
//! by the sender once the receiver has accepted:
//!
//! ```text
//! sender                              receiver
//!   ── FileHeader {filename,size,digest} ─▶   (needs an armed save path)
//!   ◀─────── {status: ready|rejected} ──────
//!   ═══════ size bytes, 8 KiB chunks ══════▶
//!   ◀─────────── {md5_match} ───────────────
//! ```
//!
//! Every outcome (success, rejection, cancellation, error) funnels through
//! [`FileTransferService::conclude`], which publishes it and removes all
//! per-filename state.

pub mod frame;
pub mod receive;
pub mod send;

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use lanchat_core::digest::{self, Digest};
use lanchat_core::wire::UNKNOWN_SENDER;
use lanchat_core::{FileHeader, HeaderReply};

use crate::backoff::Backoff;
use crate::bindings::SavePathBindings;
use crate::error::TransferError;
use crate::event::{EventBus, NetEvent};
use crate::presence::PresenceRegistry;
use crate::transfer_registry::{Operation, TransferRegistry, TransferStatus};

use frame::{read_frame, write_frame};
use receive::{is_plain_filename, ReceiveJob};
use send::SendJob;

/// How long an inbound connection may take to send its header.
const HEADER_TIMEOUT: Duration = Duration::from_secs(30);

/// How often the accept loop drops lapsed save-path bindings.
const BINDING_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// `floor(done * 100 / total)`, with an empty file counting as done.
pub fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done as u128 * 100) / total as u128).min(100) as u8
}

/// Run `io` unless a cancel for `filename` arrives first.
async fn or_cancel<T, F>(
    registry: &TransferRegistry,
    filename: &str,
    io: F,
) -> Result<T, TransferError>
where
    F: Future<Output = Result<T, TransferError>>,
{
    tokio::select! {
        biased;
        _ = registry.cancelled(filename) => {
            tracing::info!(filename, "cancel observed");
            Err(TransferError::Cancelled)
        }
        done = io => done,
    }
}

/// What the UDP `file_request` announces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOffer {
    pub filename: String,
    pub size: u64,
    pub digest: Digest,
}

/// A local file offered to a peer, waiting for (or past) its answer.
#[derive(Debug, Clone)]
struct Outbound {
    path: PathBuf,
    peer: IpAddr,
    started: bool,
}

#[derive(Clone)]
pub struct FileTransferService {
    registry: TransferRegistry,
    bindings: SavePathBindings,
    presence: PresenceRegistry,
    events: EventBus,
    outbound: Arc<DashMap<String, Outbound>>,
    peer_port: Arc<AtomicU16>,
    connect_timeout: Duration,
}

impl FileTransferService {
    pub fn new(
        registry: TransferRegistry,
        bindings: SavePathBindings,
        presence: PresenceRegistry,
        events: EventBus,
        peer_port: u16,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            bindings,
            presence,
            events,
            outbound: Arc::new(DashMap::new()),
            peer_port: Arc::new(AtomicU16::new(peer_port)),
            connect_timeout,
        }
    }

    pub fn registry(&self) -> &TransferRegistry {
        &self.registry
    }

    pub fn bindings(&self) -> &SavePathBindings {
        &self.bindings
    }

    /// TCP port file connections are opened to.
    pub fn peer_port(&self) -> u16 {
        self.peer_port.load(Ordering::Relaxed)
    }

    pub fn set_peer_port(&self, port: u16) {
        self.peer_port.store(port, Ordering::Relaxed);
    }

    /// Offers still waiting for the peer's answer or in flight.
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    // ── Sending side ──────────────────────────────────────────────────────────

    /// Register a local file for sending to `peer`. The caller announces the
    /// returned offer over UDP.
    pub async fn offer(&self, path: &Path, peer: IpAddr) -> Result<FileOffer, TransferError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| TransferError::InvalidFilename(path.display().to_string()))?;

        if self.registry.get(&filename).is_some() {
            return Err(TransferError::Duplicate(filename));
        }

        let meta = tokio::fs::metadata(path).await?;
        if !meta.is_file() {
            return Err(TransferError::InvalidFilename(path.display().to_string()));
        }
        let size = meta.len();

        let owned = path.to_path_buf();
        let digest = tokio::task::spawn_blocking(move || digest::md5_file(&owned))
            .await
            .map_err(|e| TransferError::Io(std::io::Error::other(e)))??;

        self.registry
            .begin(&filename, size, digest, Operation::Send, peer)?;
        self.outbound.insert(
            filename.clone(),
            Outbound {
                path: path.to_path_buf(),
                peer,
                started: false,
            },
        );

        tracing::info!(filename, size, digest = %hex::encode(digest), peer = %peer, "file offered");
        Ok(FileOffer {
            filename,
            size,
            digest,
        })
    }

    /// Abandon an offer whose announcement could not be sent.
    pub fn withdraw(&self, filename: &str, reason: TransferError) {
        if self.claim_waiting(filename) {
            self.conclude(filename, Operation::Send, Err(reason));
        }
    }

    /// Take an offer that has not been answered yet. Exactly one of this
    /// and an acceptance in `handle_response` wins.
    fn claim_waiting(&self, filename: &str) -> bool {
        self.outbound
            .remove_if(filename, |_, offer| !offer.started)
            .is_some()
    }

    /// Handle a `file_response` datagram from `from`.
    ///
    /// Answers for unknown offers, from the wrong peer, or for an offer that
    /// already started are ignored.
    pub fn handle_response(&self, filename: &str, from: IpAddr, accepted: bool) {
        let path = {
            let Some(mut offer) = self.outbound.get_mut(filename) else {
                tracing::debug!(filename, from = %from, "response for unknown offer");
                return;
            };
            if offer.peer != from || offer.started {
                tracing::debug!(filename, from = %from, "ignoring stray file response");
                return;
            }
            if accepted {
                offer.started = true;
            }
            offer.path.clone()
        };

        if !accepted {
            self.conclude(filename, Operation::Send, Err(TransferError::Rejected));
            return;
        }

        let Some(record) = self.registry.get(filename) else {
            self.outbound.remove(filename);
            return;
        };

        self.events.emit(NetEvent::FileAccepted {
            filename: filename.to_string(),
            target: from,
        });

        let job = SendJob {
            filename: filename.to_string(),
            path,
            size: record.size,
            digest: record.digest,
            addr: SocketAddr::new(from, self.peer_port()),
        };
        let svc = self.clone();
        tokio::spawn(async move {
            if !svc.outbound.contains_key(&job.filename) {
                tracing::debug!(filename = %job.filename, "offer gone before connect");
                return;
            }
            let outcome = send::run(&svc.registry, &job, svc.connect_timeout).await;
            svc.conclude(&job.filename, Operation::Send, outcome);
        });
    }

    // ── Receiving side ────────────────────────────────────────────────────────

    /// Bind a destination for an incoming file. Not yet accepted.
    pub fn set_save_path(&self, filename: &str, path: PathBuf) {
        self.bindings.set(filename, path);
    }

    /// Accept an incoming request from `peer`: arms the save-path binding.
    pub fn accept_incoming(&self, filename: &str, peer: IpAddr) -> Result<(), TransferError> {
        if self.bindings.arm(filename, peer) {
            tracing::info!(filename, peer = %peer, "incoming file accepted");
            Ok(())
        } else {
            Err(TransferError::NoSavePath(filename.to_string()))
        }
    }

    /// Decline an incoming request: drops any binding.
    pub fn decline_incoming(&self, filename: &str) {
        self.bindings.clear(filename);
        tracing::info!(filename, "incoming file declined");
    }

    /// Accept file connections until shutdown. Each connection is handled
    /// on its own task; a failure there never stops this loop.
    pub async fn accept_loop(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) {
        let mut backoff = Backoff::new();
        let mut sweep = tokio::time::interval(BINDING_SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(addr = ?listener.local_addr().ok(), "file listener starting");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("file listener shutting down");
                    return;
                }
                _ = sweep.tick() => {
                    for filename in self.bindings.sweep(Instant::now()) {
                        tracing::info!(filename, "accepted file never connected; binding dropped");
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        backoff.reset();
                        let svc = self.clone();
                        tokio::spawn(async move { svc.handle_inbound(stream, addr).await });
                    }
                    Err(e) => {
                        let delay = backoff.next_delay();
                        tracing::warn!(error = %e, retry_ms = delay.as_millis() as u64, "accept failed");
                        tokio::time::sleep(delay).await;
                    }
                },
            }
        }
    }

    async fn handle_inbound(&self, mut stream: TcpStream, addr: SocketAddr) {
        let peer = addr.ip().to_canonical();

        let header: FileHeader =
            match tokio::time::timeout(HEADER_TIMEOUT, read_frame(&mut stream)).await {
                Ok(Ok(h)) => h,
                Ok(Err(e)) => {
                    tracing::debug!(peer = %peer, error = %e, "bad file header");
                    return;
                }
                Err(_) => {
                    tracing::debug!(peer = %peer, "timed out waiting for file header");
                    return;
                }
            };
        let filename = header.filename.as_str();

        let (path, digest) = match self.admit(&header, peer) {
            Ok(admitted) => admitted,
            Err(reason) => {
                tracing::info!(filename, peer = %peer, reason, "inbound file rejected");
                let _ = write_frame(&mut stream, &HeaderReply::Rejected).await;
                return;
            }
        };

        let job = ReceiveJob {
            filename,
            size: header.size,
            digest,
            peer,
        };

        let file = match tokio::fs::File::create(&path).await {
            Ok(f) => f,
            Err(e) => {
                self.conclude(filename, Operation::Receive, Err(e.into()));
                return;
            }
        };

        let outcome = match write_frame(&mut stream, &HeaderReply::Ready).await {
            Ok(()) => receive::stream_into(&self.registry, &mut stream, file, &job).await,
            Err(e) => Err(e),
        };

        if outcome.is_err() {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove partial file");
            }
        } else {
            tracing::info!(filename, bytes = header.size, path = %path.display(), "file received");
        }
        self.conclude(filename, Operation::Receive, outcome);
    }

    /// Header checks. On success the binding is consumed and a receive
    /// record exists.
    fn admit(
        &self,
        header: &FileHeader,
        peer: IpAddr,
    ) -> Result<(PathBuf, Digest), &'static str> {
        let filename = header.filename.as_str();
        if !is_plain_filename(filename) {
            return Err("filename is not a bare name");
        }
        let digest = digest::from_hex(&header.digest).ok_or("digest is not 128-bit hex")?;
        let path = self
            .bindings
            .claim(filename, peer)
            .ok_or("no accepted save path")?;
        self.registry
            .begin(filename, header.size, digest, Operation::Receive, peer)
            .map_err(|_| "a transfer with that name is already active")?;
        Ok((path, digest))
    }

    // ── Both sides ────────────────────────────────────────────────────────────

    /// Cancel whatever is known under `filename`. Returns false if nothing was.
    ///
    /// An offer still waiting for its answer is concluded immediately; a
    /// running transfer is flagged and its worker stops at once; an accepted
    /// inbound file that has not connected yet is disarmed.
    pub fn cancel(&self, filename: &str) -> bool {
        if self.claim_waiting(filename) {
            self.conclude(filename, Operation::Send, Err(TransferError::Cancelled));
            return true;
        }
        if self.registry.request_cancel(filename) {
            tracing::info!(filename, "cancel requested");
            return true;
        }
        self.bindings.clear(filename)
    }

    /// Publish a finished transfer's outcome and drop all its state.
    fn conclude(&self, filename: &str, operation: Operation, outcome: Result<(), TransferError>) {
        let peer = self.registry.get(filename).map(|r| r.peer);
        match outcome {
            Ok(()) => {
                self.registry.transition(filename, TransferStatus::Completed);
                self.events.emit(NetEvent::TransferComplete {
                    filename: filename.to_string(),
                    operation,
                });
                tracing::info!(filename, ?operation, "transfer complete");
            }
            Err(TransferError::Rejected) => {
                let sender_name = peer
                    .and_then(|ip| self.presence.username_of(&ip))
                    .unwrap_or_else(|| UNKNOWN_SENDER.to_string());
                self.events.emit(NetEvent::FileRejected {
                    filename: filename.to_string(),
                    sender_name,
                });
                tracing::info!(filename, ?operation, "transfer rejected");
            }
            Err(e) if e.is_cancellation() => {
                self.registry.transition(filename, TransferStatus::Cancelled);
                tracing::info!(filename, ?operation, "transfer cancelled");
            }
            Err(e) => {
                self.registry.transition(filename, TransferStatus::Error);
                self.events.emit(NetEvent::TransferError {
                    filename: filename.to_string(),
                    operation,
                    message: e.to_string(),
                });
                tracing::warn!(filename, ?operation, error = %e, "transfer failed");
            }
        }

        if operation == Operation::Send {
            self.outbound.remove(filename);
        }
        self.registry.finish(filename);
    }
}

//! Receiving side of the file connection.

use std::net::IpAddr;
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use lanchat_core::digest::{Digest, StreamDigest};
use lanchat_core::wire::CHUNK_SIZE;
use lanchat_core::VerifyReply;

use super::frame::write_frame;
use super::{or_cancel, percent};
use crate::error::TransferError;
use crate::transfer_registry::{TransferRegistry, TransferStatus};

/// An inbound transfer that passed the header checks.
#[derive(Debug)]
pub struct ReceiveJob<'a> {
    pub filename: &'a str,
    pub size: u64,
    pub digest: Digest,
    pub peer: IpAddr,
}

/// A header filename must be a bare name: no directories, no traversal.
pub fn is_plain_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name)
}

/// Stream `job.size` bytes from the socket into `file`, then report the
/// digest verdict back to the sender. `ready` has already been sent. A
/// cancel interrupts a read even while the sender is silent.
pub async fn stream_into(
    registry: &TransferRegistry,
    stream: &mut TcpStream,
    mut file: File,
    job: &ReceiveJob<'_>,
) -> Result<(), TransferError> {
    let filename = job.filename;
    registry.transition(filename, TransferStatus::Transferring);

    let mut hasher = StreamDigest::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut received: u64 = 0;

    while received < job.size {
        let want = (job.size - received).min(CHUNK_SIZE as u64) as usize;
        let n = or_cancel(registry, filename, async {
            stream.read(&mut buf[..want]).await.map_err(TransferError::from)
        })
        .await?;
        if n == 0 {
            return Err(TransferError::PrematureEof {
                received,
                expected: job.size,
            });
        }
        hasher.update(&buf[..n]);
        file.write_all(&buf[..n]).await?;
        received += n as u64;
        registry.report_progress(filename, percent(received, job.size));
    }
    file.flush().await?;
    drop(file);

    if job.size == 0 {
        registry.report_progress(filename, 100);
    }

    let matched = hasher.finish() == job.digest;
    write_frame(stream, &VerifyReply { md5_match: matched }).await?;

    if matched {
        Ok(())
    } else {
        tracing::warn!(filename, peer = %job.peer, "digest mismatch");
        Err(TransferError::ChecksumMismatch)
    }
}

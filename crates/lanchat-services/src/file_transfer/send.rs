//! Sending side of the file connection.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use lanchat_core::digest::{self, Digest};
use lanchat_core::wire::CHUNK_SIZE;
use lanchat_core::{FileHeader, HeaderReply, VerifyReply};

use super::frame::{read_frame, write_frame};
use super::{or_cancel, percent};
use crate::error::TransferError;
use crate::transfer_registry::{TransferRegistry, TransferStatus};

/// Everything a send worker needs, captured when the offer was made.
#[derive(Debug, Clone)]
pub struct SendJob {
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
    pub digest: Digest,
    pub addr: SocketAddr,
}

/// Connect, stream the file, and wait for the receiver's verdict. A cancel
/// is honoured at any point before the last byte is written.
pub async fn run(
    registry: &TransferRegistry,
    job: &SendJob,
    connect_timeout: Duration,
) -> Result<(), TransferError> {
    let filename = job.filename.as_str();

    let mut stream = or_cancel(registry, filename, handshake(job, connect_timeout)).await?;

    registry.transition(filename, TransferStatus::Transferring);

    let mut file = File::open(&job.path).await?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut sent: u64 = 0;

    while sent < job.size {
        if registry.take_cancel(filename) {
            tracing::info!(filename, sent, "send cancelled");
            return Err(TransferError::Cancelled);
        }

        let want = (job.size - sent).min(CHUNK_SIZE as u64) as usize;
        let n = file.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(TransferError::Protocol(format!(
                "source file shrank to {sent} of {} bytes during transfer",
                job.size
            )));
        }
        or_cancel(registry, filename, async {
            stream.write_all(&buf[..n]).await.map_err(TransferError::from)
        })
        .await?;
        sent += n as u64;
        registry.report_progress(filename, percent(sent, job.size));
    }
    stream.flush().await?;

    if job.size == 0 {
        registry.report_progress(filename, 100);
    }

    let verdict: VerifyReply = read_frame(&mut stream).await?;
    if verdict.md5_match {
        Ok(())
    } else {
        Err(TransferError::ChecksumMismatch)
    }
}

/// Open the connection, send the header and wait for `ready`.
async fn handshake(job: &SendJob, connect_timeout: Duration) -> Result<TcpStream, TransferError> {
    let mut stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(job.addr)).await
    {
        Ok(conn) => conn?,
        Err(_) => {
            return Err(TransferError::ConnectTimeout {
                addr: job.addr,
                secs: connect_timeout.as_secs(),
            })
        }
    };
    stream.set_nodelay(true)?;
    tracing::debug!(filename = %job.filename, addr = %job.addr, "file connection open");

    write_frame(
        &mut stream,
        &FileHeader {
            filename: job.filename.clone(),
            size: job.size,
            digest: digest::to_hex(&job.digest),
        },
    )
    .await?;

    match read_frame::<_, HeaderReply>(&mut stream).await? {
        HeaderReply::Ready => Ok(stream),
        HeaderReply::Rejected => Err(TransferError::Rejected),
    }
}

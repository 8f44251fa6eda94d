//! Length-prefixed JSON frames on the file connection.
//!
//! Wire: `u32` big-endian length, then that many bytes of JSON. TCP gives
//! no message boundaries, so every control message is framed; file bytes
//! are not.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use lanchat_core::wire::MAX_FRAME_LEN;

use crate::error::TransferError;

pub async fn write_frame<W, T>(w: &mut W, value: &T) -> Result<(), TransferError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(value).map_err(|e| TransferError::Protocol(e.to_string()))?;
    let len = u32::try_from(body.len())
        .ok()
        .filter(|&n| n <= MAX_FRAME_LEN)
        .ok_or_else(|| TransferError::Protocol(format!("frame of {} bytes", body.len())))?;
    w.write_u32(len).await?;
    w.write_all(&body).await?;
    w.flush().await?;
    Ok(())
}

pub async fn read_frame<R, T>(r: &mut R) -> Result<T, TransferError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = r.read_u32().await?;
    if len > MAX_FRAME_LEN {
        return Err(TransferError::Protocol(format!(
            "frame length {len} exceeds {MAX_FRAME_LEN}"
        )));
    }
    let mut body = vec![0u8; len as usize];
    r.read_exact(&mut body).await?;
    serde_json::from_slice(&body).map_err(|e| TransferError::Protocol(format!("bad frame: {e}")))
}

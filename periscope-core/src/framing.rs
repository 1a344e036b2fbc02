//! Length-prefixed frame codec for the device-to-bridge byte stream.
//!
//! That leg is plain TCP with no message boundaries, so each frame is
//! delimited explicitly: a 4-byte unsigned big-endian length followed by
//! that many encoded-image bytes.

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame. A length prefix above this is treated as
/// stream corruption rather than an allocation request.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    /// The stream ended cleanly between frames.
    #[error("stream closed")]
    Closed,

    #[error("frame length {0} exceeds maximum {MAX_FRAME_LEN}")]
    Oversize(u32),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Read one length-prefixed frame. A clean EOF before the length prefix is
/// `FrameError::Closed`; EOF mid-frame is an I/O error.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Bytes, FrameError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(FrameError::Closed),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf);
    if len as usize > MAX_FRAME_LEN {
        return Err(FrameError::Oversize(len));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(Bytes::from(payload))
}

/// Write one length-prefixed frame and flush it.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), FrameError> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::Oversize(u32::MAX))?;
    if len as usize > MAX_FRAME_LEN {
        return Err(FrameError::Oversize(len));
    }

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

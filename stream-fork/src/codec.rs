//! Length-prefixed framing shared by the server and the stream reader.
//!
//! A frame is a 4-byte big-endian unsigned length followed by that many raw
//! payload bytes. There is no handshake and no trailer.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::FrameError;

pub const HEADER_LEN: usize = 4;

/// Encodes `message` into a single contiguous frame.
pub fn encode(message: &[u8]) -> Result<Bytes, FrameError> {
    let len = u32::try_from(message.len()).map_err(|_| FrameError::TooLarge(message.len()))?;
    let mut frame = BytesMut::with_capacity(HEADER_LEN + message.len());
    frame.put_u32(len);
    frame.put_slice(message);
    Ok(frame.freeze())
}

/// Writes one full frame. The header and payload go out in a single
/// `write_all` so a failure never leaves a half-written header behind a
/// successful return.
pub async fn write_frame<W>(writer: &mut W, message: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame.
///
/// Returns `Ok(None)` when the peer closes the stream before a complete frame
/// arrives, whether that happens between frames or in the middle of one.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Bytes>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let filled = read_full(reader, &mut header).await?;
    if filled < HEADER_LEN {
        if filled > 0 {
            debug!(filled, "stream closed inside a frame header");
        }
        return Ok(None);
    }

    let len = u32::from_be_bytes(header) as usize;
    let mut payload = vec![0u8; len];
    let filled = read_full(reader, &mut payload).await?;
    if filled < len {
        debug!(expected = len, filled, "stream closed inside a frame body");
        return Ok(None);
    }

    Ok(Some(Bytes::from(payload)))
}

/// Accumulates reads until `buf` is full or the stream reports EOF.
/// Returns the number of bytes filled.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

//! Transport adapter: reads and writes one complete 9P frame at a time.
//!
//! Blocking vs. non-blocking is a policy of the caller; this module only
//! assumes an `AsyncRead`/`AsyncWrite` byte stream (a tokio socket, a
//! `tokio::io::duplex` half in tests, ...).

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::codec::LengthDelimitedCodec;

use crate::error::Error;
use crate::fcall::Msg;
use crate::serialize;

/// The `tokio_util` length-delimited framing both the client and server
/// engines share for their `Framed` read/write halves: `size[4]` little
/// endian, including the size field itself in the count.
pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_offset(0)
        .length_field_length(4)
        .length_adjustment(-4)
        .little_endian()
        .new_codec()
}

/// Read exactly one frame from `r`: a 4-byte little-endian size prefix
/// (`4 <= size <= msize`), followed by `size - 4` more bytes. Returns the
/// frame with the size prefix stripped (`type[1] tag[2] payload`).
///
/// EOF before any bytes are read is a clean shutdown (`Ok(None)`); EOF in
/// the middle of a frame is `Error::Transport` wrapping `UnexpectedEof`.
pub async fn read_frame<R>(r: &mut R, msize: u32) -> Result<Option<Vec<u8>>, Error>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut size_buf = [0u8; 4];
    match r.read_exact(&mut size_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(Error::Transport(e)),
    }
    let size = u32::from_le_bytes(size_buf);
    if !(4..=msize).contains(&size) {
        return Err(Error::Protocol(format!(
            "frame size {size} out of bounds (4..={msize})"
        )));
    }

    let mut body = vec![0u8; size as usize - 4];
    r.read_exact(&mut body)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                Error::Transport(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated 9P frame"))
            }
            _ => Error::Transport(e),
        })?;

    Ok(Some(body))
}

/// Read exactly one frame and decode it.
pub async fn read_msg<R>(r: &mut R, msize: u32) -> Result<Option<Msg>, Error>
where
    R: tokio::io::AsyncRead + Unpin,
{
    match read_frame(r, msize).await? {
        Some(body) => Ok(Some(serialize::decode_frame(&body)?)),
        None => Ok(None),
    }
}

/// Encode `msg` and write it to `w` as a single frame. All-or-nothing: the
/// whole frame is written before returning, so callers that serialize
/// writes under a lock never see interleaved frames on the wire.
pub async fn write_msg<W>(w: &mut W, msg: &Msg, msize: u32) -> Result<(), Error>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let frame = serialize::encode_frame(msg, msize)?;
    w.write_all(&frame).await.map_err(Error::Transport)?;
    Ok(())
}

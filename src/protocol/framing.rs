use super::{CLOSE_SENTINEL, FrameError, LEN_PREFIX_SIZE, MAX_FRAME_LEN};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use std::io::{self, Read, Write};

/// One unit read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(Bytes),
    /// The peer sent the close sentinel.
    Close,
}

/// Encode `payload` as `[len i32][payload...]`.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::FrameTooLarge { len: payload.len() });
    }

    let mut buf = Vec::with_capacity(LEN_PREFIX_SIZE + payload.len());
    // Bounded by MAX_FRAME_LEN above, so the cast cannot truncate.
    buf.write_i32::<BigEndian>(payload.len() as i32)?;
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Write a single data frame and flush.
pub fn write_frame<W: Write>(w: &mut W, payload: &[u8]) -> Result<(), FrameError> {
    let buf = encode_frame(payload)?;
    w.write_all(&buf)?;
    w.flush()?;
    Ok(())
}

/// Write the close sentinel and flush.
pub fn write_close<W: Write>(w: &mut W) -> io::Result<()> {
    w.write_i32::<BigEndian>(CLOSE_SENTINEL)?;
    w.flush()
}

/// Read a single frame, blocking until it is complete.
pub fn read_frame<R: Read>(r: &mut R) -> Result<Frame, FrameError> {
    let prefix = r.read_i32::<BigEndian>()?; // io::Error -> FrameError

    let Some(len) = decode_len(prefix)? else {
        return Ok(Frame::Close);
    };

    let mut body = vec![0u8; len];
    r.read_exact(&mut body)?;

    Ok(Frame::Data(Bytes::from(body)))
}

/// Classify a length prefix: `Some(len)` for data, `None` for the close sentinel.
fn decode_len(prefix: i32) -> Result<Option<usize>, FrameError> {
    if prefix == CLOSE_SENTINEL {
        return Ok(None);
    }
    if prefix < 0 {
        return Err(FrameError::MalformedFrame("negative length prefix"));
    }

    let len = prefix as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::FrameTooLarge { len });
    }
    Ok(Some(len))
}

use super::framing::{Frame, encode_frame, read_frame};
use super::{FrameError, QueueName, Role};
use bytes::Bytes;
use std::io::{Read, Write};

/// Send both handshake frames (role, then queue name) in one write.
pub fn write_handshake<W: Write>(w: &mut W, role: Role, queue: &QueueName) -> Result<(), FrameError> {
    let mut buf = encode_frame(role.as_str().as_bytes())?;
    buf.extend_from_slice(&encode_frame(queue.as_str().as_bytes())?);
    w.write_all(&buf)?;
    w.flush()?;
    Ok(())
}

/// Read one handshake field, which must be a non-empty data frame.
pub fn read_handshake_field<R: Read>(r: &mut R) -> Result<Bytes, FrameError> {
    match read_frame(r)? {
        Frame::Close => Err(FrameError::MalformedFrame("close sentinel during handshake")),
        Frame::Data(field) if field.is_empty() => {
            Err(FrameError::MalformedFrame("empty handshake field"))
        }
        Frame::Data(field) => Ok(field),
    }
}

pub fn read_role<R: Read>(r: &mut R) -> Result<Role, FrameError> {
    let field = read_handshake_field(r)?;
    Role::from_wire(&field)
}

pub fn read_queue_name<R: Read>(r: &mut R) -> Result<QueueName, FrameError> {
    let field = read_handshake_field(r)?;
    QueueName::from_wire(&field)
}

//! Wire format shared by the broker and the client handles.
//!
//! Every frame is a 4-byte big-endian signed length prefix followed by that
//! many payload bytes. A connection starts with two handshake frames (role,
//! queue name) and then carries message frames in one direction.

pub mod constants;
pub mod errors;
pub mod framing;
pub mod handshake;
pub mod queue_name;
pub mod role;

pub use constants::*;
pub use errors::FrameError;
pub use framing::{Frame, encode_frame, read_frame, write_close, write_frame};
pub use handshake::{read_queue_name, read_role, write_handshake};
pub use queue_name::QueueName;
pub use role::Role;

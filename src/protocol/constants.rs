/// Protocol
/// ----------- Frame ------------------
/// Length (4B, big-endian, signed)
/// ----------- Body -------------------
/// Payload (0..=65535 bytes)
///
/// Length values:
///   0..=MAX_FRAME_LEN  payload length
///   CLOSE_SENTINEL     orderly close, no payload follows
///   anything else      rejected
pub const LEN_PREFIX_SIZE: usize = 4;

/// Maximum payload size of a single frame.
pub const MAX_FRAME_LEN: usize = 65_535;

/// Length prefix announcing that the sender is closing the connection.
pub const CLOSE_SENTINEL: i32 = -1;

/// Maximum size of a UTF-8 encoded queue name.
pub const MAX_QUEUE_NAME_LEN: usize = 255;

/// First handshake field sent by producers.
pub const PRODUCER_ROLE: &str = "producer";

/// First handshake field sent by consumers.
pub const CONSUMER_ROLE: &str = "consumer";

/// Port the broker listens on when none is configured.
pub const DEFAULT_PORT: u16 = 18_273;

/// Defines the severity levels for log messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Designates very fine-grained informational events.
    Trace,
    /// Designates fine-grained informational events that are most useful to debug the broker.
    Debug,
    /// Designates informational messages that highlight the progress of the broker at coarse-grained level.
    Info,
    /// Designates potentially harmful situations, such as a misbehaving peer.
    Warn,
    /// Designates error events that might still allow the broker to continue running.
    Error,
}

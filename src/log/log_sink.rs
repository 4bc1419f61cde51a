use crate::log::log_level::LogLevel;

/// Destination for log lines produced by the broker, its sessions and the client handles.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, msg: &str, target: &'static str);
}

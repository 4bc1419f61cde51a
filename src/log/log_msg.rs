use crate::log::log_level::LogLevel;

/// A single log line on its way to the logger worker.
///
/// Carries the severity, the wall-clock timestamp, the origin (module path)
/// and the already formatted text.
#[derive(Debug, Clone)]
pub struct LogMsg {
    /// The severity level of the line.
    pub level: LogLevel,
    /// Milliseconds since the UNIX epoch at the time the line was produced.
    pub ts_ms: u128,
    /// The formatted message.
    pub text: String,
    /// The module path the line was emitted from.
    pub target: &'static str,
}

impl LogMsg {
    /// Creates a new `LogMsg`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use rustymq::log::log_level::LogLevel;
    /// use rustymq::log::log_msg::LogMsg;
    ///
    /// let msg = LogMsg::new(LogLevel::Info, "queue orders created", "rustymq::broker", 1_700_000_000_000);
    /// assert_eq!(msg.render(), "[Info] 1700000000000 | rustymq::broker | queue orders created");
    /// ```
    pub fn new(
        level: LogLevel,
        text: impl Into<String>,
        target: &'static str,
        ts_ms: u128,
    ) -> Self {
        Self {
            level,
            ts_ms,
            text: text.into(),
            target,
        }
    }

    /// Renders the line the way it is written to the log file.
    pub fn render(&self) -> String {
        format!(
            "[{:?}] {} | {} | {}",
            self.level, self.ts_ms, self.target, self.text
        )
    }
}

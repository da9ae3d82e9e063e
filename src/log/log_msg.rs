use crate::log::log_level::LogLevel;

/// One queued log line.
#[derive(Debug, Clone)]
pub struct LogMsg {
    pub level: LogLevel,
    /// Milliseconds since the UNIX epoch at enqueue time.
    pub ts_ms: u128,
    pub text: String,
    /// `module_path!()` of the caller.
    pub target: &'static str,
}

impl LogMsg {
    pub fn new(level: LogLevel, text: impl Into<String>, target: &'static str, ts_ms: u128) -> Self {
        Self {
            level,
            ts_ms,
            text: text.into(),
            target,
        }
    }
}

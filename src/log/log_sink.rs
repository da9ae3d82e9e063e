use crate::log::log_level::LogLevel;

/// Where components send their log lines. `log` never blocks the packet path.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, msg: &str, target: &'static str);

    /// Lets callers skip formatting for lines the sink would drop anyway.
    fn enabled(&self, _level: LogLevel) -> bool {
        true
    }
}

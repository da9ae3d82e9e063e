use crate::log::{log_level::LogLevel, log_sink::LogSink};

/// Discards everything. Tests hand this to every component.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogSink;

impl LogSink for NoopLogSink {
    #[inline]
    fn log(&self, _level: LogLevel, _msg: &str, _target: &'static str) {}

    fn enabled(&self, _level: LogLevel) -> bool {
        false
    }
}

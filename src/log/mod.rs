//! Leveled logging through [`LogSink`]: a bounded file logger for the
//! binary and a no-op sink for tests.

pub mod log_level;
pub mod log_macros;
pub mod log_msg;
pub mod log_sink;
pub mod logger;
pub mod logger_handle;
pub mod noop_log_sink;
pub use log_level::LogLevel;
pub use log_sink::LogSink;
pub use noop_log_sink::NoopLogSink;

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the UNIX epoch, `0` if the clock is before it.
#[must_use]
pub fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

//! Leveled logging macros over any [`LogSink`](crate::log::log_sink::LogSink).
//!
//! Each level is gated by a cargo feature (`log-trace` .. `log-error`, default
//! `log-info`). A disabled level expands to a no-op that still borrows the
//! sink, so no formatting happens and no binding goes unused. Enabled levels
//! ask [`LogSink::enabled`](crate::log::log_sink::LogSink::enabled) before
//! formatting, which lets the runtime `[Logging] level` filter skip work too.

#[doc(hidden)]
#[macro_export]
macro_rules! sink_log {
    ($sink:expr, $lvl:expr, $($arg:tt)*) => {{
        let __sink = &$sink;
        let __lvl = $lvl;
        if __sink.enabled(__lvl) {
            __sink.log(__lvl, &format!($($arg)*), module_path!());
        }
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! sink_off {
    ($sink:expr, $($arg:tt)*) => {{
        let _ = &$sink;
    }};
}

#[cfg(feature = "log-trace")]
#[macro_export]
macro_rules! sink_trace { ($sink:expr, $($arg:tt)*) => { $crate::sink_log!($sink, $crate::log::log_level::LogLevel::Trace, $($arg)*) } }
#[cfg(not(feature = "log-trace"))]
#[macro_export]
macro_rules! sink_trace { ($($arg:tt)*) => { $crate::sink_off!($($arg)*) } }

#[cfg(feature = "log-debug")]
#[macro_export]
macro_rules! sink_debug { ($sink:expr, $($arg:tt)*) => { $crate::sink_log!($sink, $crate::log::log_level::LogLevel::Debug, $($arg)*) } }
#[cfg(not(feature = "log-debug"))]
#[macro_export]
macro_rules! sink_debug { ($($arg:tt)*) => { $crate::sink_off!($($arg)*) } }

#[cfg(feature = "log-info")]
#[macro_export]
macro_rules! sink_info { ($sink:expr, $($arg:tt)*) => { $crate::sink_log!($sink, $crate::log::log_level::LogLevel::Info, $($arg)*) } }
#[cfg(not(feature = "log-info"))]
#[macro_export]
macro_rules! sink_info { ($($arg:tt)*) => { $crate::sink_off!($($arg)*) } }

#[cfg(feature = "log-warn")]
#[macro_export]
macro_rules! sink_warn { ($sink:expr, $($arg:tt)*) => { $crate::sink_log!($sink, $crate::log::log_level::LogLevel::Warn, $($arg)*) } }
#[cfg(not(feature = "log-warn"))]
#[macro_export]
macro_rules! sink_warn { ($($arg:tt)*) => { $crate::sink_off!($($arg)*) } }

#[cfg(feature = "log-error")]
#[macro_export]
macro_rules! sink_error { ($sink:expr, $($arg:tt)*) => { $crate::sink_log!($sink, $crate::log::log_level::LogLevel::Error, $($arg)*) } }
#[cfg(not(feature = "log-error"))]
#[macro_export]
macro_rules! sink_error { ($($arg:tt)*) => { $crate::sink_off!($($arg)*) } }

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use crate::log::{log_level::LogLevel, log_sink::LogSink};
    use std::sync::{Arc, Mutex};

    struct Capture {
        min: LogLevel,
        lines: Mutex<Vec<(LogLevel, String)>>,
    }

    impl LogSink for Capture {
        fn log(&self, level: LogLevel, msg: &str, _target: &'static str) {
            self.lines.lock().unwrap().push((level, msg.to_string()));
        }

        fn enabled(&self, level: LogLevel) -> bool {
            level >= self.min
        }
    }

    #[test]
    fn sink_filter_applies_before_formatting() {
        let capture = Arc::new(Capture {
            min: LogLevel::Error,
            lines: Mutex::new(Vec::new()),
        });
        crate::sink_warn!(capture, "filtered");
        crate::sink_error!(capture, "kept");
        assert_eq!(
            capture.lines.lock().unwrap().as_slice(),
            &[(LogLevel::Error, "kept".to_string())]
        );
    }
}

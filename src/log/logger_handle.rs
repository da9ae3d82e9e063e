use std::sync::mpsc;

use crate::log::{log_level::LogLevel, log_msg::LogMsg, log_sink::LogSink, now_millis};

/// Cloneable producer side of the [`Logger`](super::logger::Logger) queue.
///
/// Lines below `min_level` are filtered before formatting. A full queue
/// drops the line; poll loops and DTLS workers never wait on the disk.
#[derive(Clone)]
pub struct LoggerHandle {
    pub(super) tx: mpsc::SyncSender<LogMsg>,
    pub(super) min_level: LogLevel,
}

impl LogSink for LoggerHandle {
    #[inline]
    fn log(&self, level: LogLevel, msg: &str, target: &'static str) {
        let _ = self.try_log(level, msg, target);
    }

    #[inline]
    fn enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }
}

impl LoggerHandle {
    #[must_use]
    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    /// Enqueues one line without blocking. Filtered lines count as sent.
    ///
    /// # Errors
    /// `TrySendError::Full` when the queue is at capacity and
    /// `TrySendError::Disconnected` once the writer thread is gone.
    pub fn try_log<S: Into<String>>(
        &self,
        level: LogLevel,
        text: S,
        target: &'static str,
    ) -> Result<(), mpsc::TrySendError<LogMsg>> {
        if !self.enabled(level) {
            return Ok(());
        }
        self.tx
            .try_send(LogMsg::new(level, text, target, now_millis()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use std::sync::mpsc::{TrySendError, sync_channel};

    fn handle(cap: usize, min_level: LogLevel) -> (LoggerHandle, mpsc::Receiver<LogMsg>) {
        let (tx, rx) = sync_channel::<LogMsg>(cap);
        (LoggerHandle { tx, min_level }, rx)
    }

    #[test]
    fn queued_line_keeps_level_target_and_time() {
        let (h, rx) = handle(2, LogLevel::Trace);
        h.try_log(LogLevel::Info, "[ICE] selected", "rustygate::ice").unwrap();
        let msg = rx.recv().unwrap();
        assert_eq!(msg.level, LogLevel::Info);
        assert_eq!(msg.text, "[ICE] selected");
        assert_eq!(msg.target, "rustygate::ice");
        assert!(msg.ts_ms > 0);
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (h, _rx) = handle(1, LogLevel::Trace);
        h.try_log(LogLevel::Warn, "first", "t").unwrap();
        assert!(matches!(
            h.try_log(LogLevel::Warn, "second", "t"),
            Err(TrySendError::Full(_))
        ));
    }

    #[test]
    fn lines_below_min_level_never_reach_the_queue() {
        let (h, rx) = handle(4, LogLevel::Warn);
        h.log(LogLevel::Debug, "noise", "t");
        h.log(LogLevel::Error, "signal", "t");
        assert_eq!(rx.try_iter().map(|m| m.text).collect::<Vec<_>>(), vec!["signal"]);
    }

    #[test]
    fn gone_writer_is_reported_not_panicked() {
        let (h, rx) = handle(1, LogLevel::Trace);
        drop(rx);
        h.log(LogLevel::Error, "lost", "t");
        assert!(matches!(
            h.try_log(LogLevel::Error, "lost", "t"),
            Err(TrySendError::Disconnected(_))
        ));
    }
}

use core::fmt;
use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    sync::{Arc, Condvar, Mutex, Weak},
    time::{Duration, Instant},
};

use crate::{log::log_sink::LogSink, sink_trace, sink_warn, transport::DatagramSink};

/// Inbound flights buffered while the worker is busy.
const MAX_QUEUED_DATAGRAMS: usize = 128;

struct AdapterQueue {
    datagrams: VecDeque<Vec<u8>>,
    closed: bool,
}

/// Datagram I/O handed to OpenSSL during one handshake.
///
/// The pipeline pushes DTLS records in from the poll thread; the handshake
/// worker drains them with a bounded wait. Writes go straight to the
/// channel socket at the remote address learned by ICE. Every `receive`
/// checks the overall deadline (`max_delay`) measured from construction.
pub struct DtlsTransportAdapter {
    queue: Mutex<AdapterQueue>,
    available: Condvar,
    sink: Weak<dyn DatagramSink>,
    started: Instant,
    max_delay: Duration,
    receive_wait: Duration,
    logger: Arc<dyn LogSink>,
}

impl fmt::Debug for DtlsTransportAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DtlsTransportAdapter")
            .field("elapsed", &self.started.elapsed())
            .field("max_delay", &self.max_delay)
            .field("pending", &self.pending())
            .finish()
    }
}

impl DtlsTransportAdapter {
    pub fn new(
        sink: Weak<dyn DatagramSink>,
        max_delay: Duration,
        receive_wait: Duration,
        logger: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            queue: Mutex::new(AdapterQueue {
                datagrams: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
            sink,
            started: Instant::now(),
            max_delay,
            receive_wait,
            logger,
        }
    }

    /// Queues one DTLS record for the worker. Never blocks.
    pub fn push(&self, datagram: &[u8]) {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.closed {
            return;
        }
        if queue.datagrams.len() >= MAX_QUEUED_DATAGRAMS {
            sink_warn!(
                self.logger,
                "[DTLS IO] Inbound queue full, dropping {} bytes",
                datagram.len()
            );
            return;
        }
        queue.datagrams.push_back(datagram.to_vec());
        drop(queue);
        self.available.notify_one();
    }

    /// Waits up to `wait` for one queued datagram and copies it into `buf`.
    ///
    /// Returns `WouldBlock` when nothing arrived in time, `TimedOut` once
    /// the overall deadline is exceeded and `ConnectionAborted` after
    /// [`close`](Self::close).
    pub fn receive(&self, buf: &mut [u8], wait: Duration) -> io::Result<usize> {
        if self.is_expired() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "handshake taking too long",
            ));
        }

        let deadline = Instant::now() + wait;
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if queue.closed {
                return Err(io::Error::from(io::ErrorKind::ConnectionAborted));
            }
            if let Some(datagram) = queue.datagrams.pop_front() {
                let n = datagram.len().min(buf.len());
                buf[..n].copy_from_slice(&datagram[..n]);
                if n < datagram.len() {
                    sink_warn!(
                        self.logger,
                        "[DTLS IO] Truncated {} byte record to {}",
                        datagram.len(),
                        n
                    );
                }
                sink_trace!(self.logger, "[DTLS IO] Read {} bytes", n);
                return Ok(n);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(io::Error::from(io::ErrorKind::WouldBlock));
            }
            queue = self
                .available
                .wait_timeout(queue, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
    }

    /// Writes one record to the remote address. After the deadline, or
    /// before ICE has chosen a remote, the record is dropped with a warning.
    pub fn send(&self, data: &[u8]) -> io::Result<usize> {
        if self.is_expired() {
            sink_warn!(
                self.logger,
                "[DTLS IO] Handshake timed out, dropping {} outbound bytes",
                data.len()
            );
            return Ok(data.len());
        }
        let Some(sink) = self.sink.upgrade() else {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        };
        let Some(remote) = sink.remote_addr() else {
            sink_warn!(
                self.logger,
                "[DTLS IO] No remote address yet, dropping {} bytes",
                data.len()
            );
            return Ok(data.len());
        };

        sink_trace!(
            self.logger,
            "[DTLS IO] Sending {} bytes to {}",
            data.len(),
            remote
        );
        match sink.send_to(data, remote) {
            Ok(n) => Ok(n),
            // The flight is retransmitted by OpenSSL's timer.
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(data.len()),
            Err(e) => Err(e),
        }
    }

    /// Wakes a waiting worker and rejects further input.
    pub fn close(&self) {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.closed = true;
        queue.datagrams.clear();
        drop(queue);
        self.available.notify_all();
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.started.elapsed() > self.max_delay
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .datagrams
            .len()
    }

    pub(crate) fn stream(self: &Arc<Self>) -> AdapterStream {
        AdapterStream {
            adapter: self.clone(),
        }
    }
}

/// `Read + Write` view of the adapter for `openssl::ssl::SslStream`.
pub(crate) struct AdapterStream {
    adapter: Arc<DtlsTransportAdapter>,
}

impl fmt::Debug for AdapterStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.adapter.fmt(f)
    }
}

impl Read for AdapterStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.adapter.receive(buf, self.adapter.receive_wait)
    }
}

impl Write for AdapterStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.adapter.send(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::NoopLogSink;
    use std::{net::SocketAddr, thread};

    #[derive(Default)]
    struct CaptureSink {
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl DatagramSink for CaptureSink {
        fn send_to(&self, data: &[u8], _to: SocketAddr) -> io::Result<usize> {
            self.sent.lock().unwrap().push(data.to_vec());
            Ok(data.len())
        }

        fn remote_addr(&self) -> Option<SocketAddr> {
            Some("127.0.0.1:5000".parse().unwrap())
        }
    }

    fn adapter(sink: &Arc<CaptureSink>, max_delay: Duration) -> Arc<DtlsTransportAdapter> {
        let sink: Arc<dyn DatagramSink> = sink.clone();
        Arc::new(DtlsTransportAdapter::new(
            Arc::downgrade(&sink),
            max_delay,
            Duration::from_millis(10),
            Arc::new(NoopLogSink),
        ))
    }

    #[test]
    fn receive_returns_queued_datagram() {
        let sink = Arc::new(CaptureSink::default());
        let a = adapter(&sink, Duration::from_secs(5));
        a.push(&[22, 254, 253, 0]);
        let mut buf = [0u8; 32];
        let n = a.receive(&mut buf, Duration::from_millis(10)).unwrap();
        assert_eq!(&buf[..n], &[22, 254, 253, 0]);
        assert_eq!(a.pending(), 0);
    }

    #[test]
    fn empty_queue_would_block_after_wait() {
        let sink = Arc::new(CaptureSink::default());
        let a = adapter(&sink, Duration::from_secs(5));
        let mut buf = [0u8; 32];
        let start = Instant::now();
        let err = a.receive(&mut buf, Duration::from_millis(30)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn push_wakes_waiting_receiver() {
        let sink = Arc::new(CaptureSink::default());
        let a = adapter(&sink, Duration::from_secs(5));
        let pusher = a.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            pusher.push(b"late");
        });
        let mut buf = [0u8; 8];
        let n = a.receive(&mut buf, Duration::from_secs(2)).unwrap();
        assert_eq!(&buf[..n], b"late");
        t.join().unwrap();
    }

    #[test]
    fn deadline_turns_receive_into_timeout_and_drops_sends() {
        let sink = Arc::new(CaptureSink::default());
        let a = adapter(&sink, Duration::from_millis(20));
        thread::sleep(Duration::from_millis(40));
        let mut buf = [0u8; 8];
        let err = a.receive(&mut buf, Duration::from_millis(10)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert_eq!(a.send(b"hello").unwrap(), 5);
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn close_aborts_receive() {
        let sink = Arc::new(CaptureSink::default());
        let a = adapter(&sink, Duration::from_secs(5));
        a.push(b"x");
        a.close();
        a.push(b"y");
        let mut buf = [0u8; 8];
        let err = a.receive(&mut buf, Duration::from_millis(10)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
    }

    #[test]
    fn send_writes_to_sink() {
        let sink = Arc::new(CaptureSink::default());
        let a = adapter(&sink, Duration::from_secs(5));
        let mut stream = a.stream();
        stream.write_all(b"flight").unwrap();
        assert_eq!(sink.sent.lock().unwrap().as_slice(), &[b"flight".to_vec()]);
    }
}

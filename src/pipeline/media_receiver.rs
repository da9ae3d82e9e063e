use std::{
    net::SocketAddr,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{
    log::log_sink::LogSink,
    sink_debug, sink_trace,
    srtp::{PacketTransformer, SrtpError},
};

/// Receives media that passed SRTP/SRTCP verification.
pub trait MediaSink: Send + Sync {
    fn on_rtp(&self, packet: Vec<u8>, from: SocketAddr);
    fn on_rtcp(&self, packet: Vec<u8>, from: SocketAddr);
}

/// Per-channel drop counters. Rejections never surface as errors.
#[derive(Debug, Default)]
pub struct ReceiveStats {
    accepted: AtomicU64,
    auth_failures: AtomicU64,
    replays: AtomicU64,
    malformed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceiveCounters {
    pub accepted: u64,
    pub auth_failures: u64,
    pub replays: u64,
    pub malformed: u64,
}

impl ReceiveStats {
    #[must_use]
    pub fn snapshot(&self) -> ReceiveCounters {
        ReceiveCounters {
            accepted: self.accepted.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            replays: self.replays.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }

    fn record(&self, err: &SrtpError) {
        let counter = match err {
            SrtpError::AuthFailed => &self.auth_failures,
            SrtpError::Replay(_) | SrtpError::TooOld(_) => &self.replays,
            _ => &self.malformed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Rtp,
    Rtcp,
}

/// Decode side of one protected flow (SRTP or SRTCP).
#[derive(Clone)]
pub struct MediaReceiver {
    kind: MediaKind,
    decoder: Arc<dyn PacketTransformer>,
    sink: Weak<dyn MediaSink>,
    stats: Arc<ReceiveStats>,
    logger: Arc<dyn LogSink>,
}

impl MediaReceiver {
    pub fn new(
        kind: MediaKind,
        decoder: Arc<dyn PacketTransformer>,
        sink: Weak<dyn MediaSink>,
        stats: Arc<ReceiveStats>,
        logger: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            kind,
            decoder,
            sink,
            stats,
            logger,
        }
    }

    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Verifies and decrypts, then hands the clear packet to the sink.
    pub fn receive(&self, bytes: &[u8], from: SocketAddr) {
        let mut packet = bytes.to_vec();
        if let Err(e) = self.decoder.transform(&mut packet) {
            self.stats.record(&e);
            match e {
                SrtpError::AuthFailed | SrtpError::Replay(_) | SrtpError::TooOld(_) => {
                    sink_trace!(self.logger, "[MEDIA] {:?} dropped from {}: {}", self.kind, from, e);
                }
                _ => {
                    sink_debug!(self.logger, "[MEDIA] {:?} undecodable from {}: {}", self.kind, from, e);
                }
            }
            return;
        }
        self.stats.accepted.fetch_add(1, Ordering::Relaxed);
        if let Some(sink) = self.sink.upgrade() {
            match self.kind {
                MediaKind::Rtp => sink.on_rtp(packet, from),
                MediaKind::Rtcp => sink.on_rtcp(packet, from),
            }
        }
    }
}

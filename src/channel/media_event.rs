use std::net::SocketAddr;

use crate::{pipeline::MediaKind, rtcp::CongestionSignal};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    Requested,
    HandshakeFailed(String),
    SocketError(String),
    Shutdown,
}

/// Lifecycle notifications for the signaling layer.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    CandidateSelected {
        call_id: String,
        remote: SocketAddr,
        use_candidate: bool,
    },
    HandshakeComplete {
        call_id: String,
    },
    HandshakeFailed {
        call_id: String,
        reason: String,
    },
    ChannelClosed {
        call_id: String,
        reason: CloseReason,
    },
    CongestionSignal {
        call_id: String,
        signal: CongestionSignal,
    },
}

impl MediaEvent {
    #[must_use]
    pub fn call_id(&self) -> &str {
        match self {
            MediaEvent::CandidateSelected { call_id, .. }
            | MediaEvent::HandshakeComplete { call_id }
            | MediaEvent::HandshakeFailed { call_id, .. }
            | MediaEvent::ChannelClosed { call_id, .. }
            | MediaEvent::CongestionSignal { call_id, .. } => call_id,
        }
    }
}

/// A verified, decrypted RTP or RTCP packet for the relay side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMedia {
    pub call_id: String,
    pub kind: MediaKind,
    pub packet: Vec<u8>,
    pub from: SocketAddr,
}

use std::{net::SocketAddr, sync::Arc};

use super::{classifier::PacketKind, media_receiver::MediaReceiver};
use crate::{dtls::DtlsHandshakeEngine, ice::StunIceEngine};

/// One demultiplexing target. `handle` must not block: DTLS only queues.
#[derive(Clone)]
pub enum PacketHandler {
    Ice(Arc<StunIceEngine>),
    Dtls(Arc<DtlsHandshakeEngine>),
    Rtp(MediaReceiver),
    Rtcp(MediaReceiver),
}

impl std::fmt::Debug for PacketHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PacketHandler::{:?}", self.kind())
    }
}

impl PacketHandler {
    #[must_use]
    pub fn kind(&self) -> PacketKind {
        match self {
            PacketHandler::Ice(_) => PacketKind::Ice,
            PacketHandler::Dtls(_) => PacketKind::Dtls,
            PacketHandler::Rtp(_) => PacketKind::Rtp,
            PacketHandler::Rtcp(_) => PacketKind::Rtcp,
        }
    }

    #[must_use]
    pub fn priority(&self) -> u8 {
        self.kind().priority()
    }

    #[must_use]
    pub fn can_handle(&self, bytes: &[u8]) -> bool {
        self.kind().matches(bytes)
    }

    /// Consumes one datagram. Returns bytes to send back to `remote_addr`.
    pub fn handle(&self, bytes: &[u8], local_addr: SocketAddr, remote_addr: SocketAddr) -> Option<Vec<u8>> {
        match self {
            PacketHandler::Ice(engine) => engine.handle(bytes, local_addr, remote_addr),
            PacketHandler::Dtls(engine) => {
                engine.enqueue(bytes);
                None
            }
            PacketHandler::Rtp(receiver) | PacketHandler::Rtcp(receiver) => {
                receiver.receive(bytes, remote_addr);
                None
            }
        }
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use byteorder::{BigEndian, ByteOrder};

use crate::log::log_sink::LogSink;
use crate::sink_debug;
use crate::srtp::{
    SrtpSessionConfig,
    constants::{MAX_SSRC_CONTEXTS, RTCP_HEADER_LEN, RTP_HEADER_LEN},
    srtcp_crypto_context::SrtcpCryptoContext,
    srtp_crypto_context::SrtpCryptoContext,
    srtp_error::SrtpError,
};

/// One direction of packet protection (encode or decode) for RTP or RTCP.
pub trait PacketTransformer: Send + Sync {
    /// Transforms `packet` in place. On error the packet must be dropped.
    fn transform(&self, packet: &mut Vec<u8>) -> Result<(), SrtpError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encode,
    Decode,
}

/// Per-SSRC contexts, each behind its own lock.
type ContextMap<C> = Mutex<HashMap<u32, Arc<Mutex<C>>>>;

/// A per-SSRC crypto context as seen by the transformers.
trait SsrcContext: Send + Sized {
    fn derive_for(&self, ssrc: u32) -> Result<Self, SrtpError>;
    fn protect(&mut self, packet: &mut Vec<u8>) -> Result<(), SrtpError>;
    fn unprotect(&mut self, packet: &mut Vec<u8>) -> Result<(), SrtpError>;
}

impl SsrcContext for SrtpCryptoContext {
    fn derive_for(&self, ssrc: u32) -> Result<Self, SrtpError> {
        let mut ctx = self.derive_context(ssrc, 0, 0)?;
        ctx.derive_srtp_keys(0)?;
        Ok(ctx)
    }

    fn protect(&mut self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        self.transform_packet(packet)
    }

    fn unprotect(&mut self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        self.reverse_transform_packet(packet)
    }
}

impl SsrcContext for SrtcpCryptoContext {
    fn derive_for(&self, ssrc: u32) -> Result<Self, SrtpError> {
        let mut ctx = self.derive_context(ssrc, 0)?;
        ctx.derive_srtcp_keys(0)?;
        Ok(ctx)
    }

    fn protect(&mut self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        self.transform_packet(packet)
    }

    fn unprotect(&mut self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        self.reverse_transform_packet(packet)
    }
}

/// Shared SSRC bookkeeping for both transformers.
///
/// A decode context for an unknown SSRC lives off-map until its first packet
/// authenticates, so rejected packets leave no state behind.
struct SsrcTable<C> {
    tag: &'static str,
    direction: Direction,
    template: C,
    contexts: ContextMap<C>,
    logger: Arc<dyn LogSink>,
}

impl<C: SsrcContext> SsrcTable<C> {
    fn new(tag: &'static str, template: C, direction: Direction, logger: Arc<dyn LogSink>) -> Self {
        Self {
            tag,
            direction,
            template,
            contexts: Mutex::new(HashMap::new()),
            logger,
        }
    }

    fn len(&self) -> usize {
        self.contexts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn apply(&self, ctx: &mut C, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        match self.direction {
            Direction::Encode => ctx.protect(packet),
            Direction::Decode => ctx.unprotect(packet),
        }
    }

    fn transform(&self, ssrc: u32, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        let existing = {
            let map = self.contexts.lock().unwrap_or_else(|e| e.into_inner());
            match map.get(&ssrc) {
                Some(ctx) => Some(ctx.clone()),
                None if map.len() >= MAX_SSRC_CONTEXTS => {
                    sink_debug!(
                        self.logger,
                        "[{}] SSRC={:#010x} refused, {} contexts in use",
                        self.tag,
                        ssrc,
                        map.len()
                    );
                    return Err(SrtpError::TooManySsrcs(map.len()));
                }
                None => None,
            }
        };
        if let Some(ctx) = existing {
            let mut ctx = ctx.lock().unwrap_or_else(|e| e.into_inner());
            return self.apply(&mut ctx, packet);
        }

        let mut ctx = self.template.derive_for(ssrc)?;
        self.apply(&mut ctx, packet)?;

        let mut map = self.contexts.lock().unwrap_or_else(|e| e.into_inner());
        if map.len() >= MAX_SSRC_CONTEXTS && !map.contains_key(&ssrc) {
            return Err(SrtpError::TooManySsrcs(map.len()));
        }
        map.entry(ssrc).or_insert_with(|| {
            sink_debug!(self.logger, "[{}] new {:?} context for SSRC={:#010x}", self.tag, self.direction, ssrc);
            Arc::new(Mutex::new(ctx))
        });
        Ok(())
    }
}

pub struct SrtpTransformer {
    table: SsrcTable<SrtpCryptoContext>,
}

impl SrtpTransformer {
    #[must_use]
    pub fn new(template: SrtpCryptoContext, direction: Direction, logger: Arc<dyn LogSink>) -> Self {
        Self {
            table: SsrcTable::new("SRTP", template, direction, logger),
        }
    }

    /// Number of SSRCs with an established context.
    #[must_use]
    pub fn context_count(&self) -> usize {
        self.table.len()
    }
}

impl PacketTransformer for SrtpTransformer {
    fn transform(&self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        if packet.len() < RTP_HEADER_LEN {
            return Err(SrtpError::TooShort(packet.len()));
        }
        let ssrc = BigEndian::read_u32(&packet[8..12]);
        self.table.transform(ssrc, packet)
    }
}

pub struct SrtcpTransformer {
    table: SsrcTable<SrtcpCryptoContext>,
}

impl SrtcpTransformer {
    #[must_use]
    pub fn new(template: SrtcpCryptoContext, direction: Direction, logger: Arc<dyn LogSink>) -> Self {
        Self {
            table: SsrcTable::new("SRTCP", template, direction, logger),
        }
    }

    #[must_use]
    pub fn context_count(&self) -> usize {
        self.table.len()
    }
}

impl PacketTransformer for SrtcpTransformer {
    fn transform(&self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        if packet.len() < RTCP_HEADER_LEN {
            return Err(SrtpError::TooShort(packet.len()));
        }
        let ssrc = BigEndian::read_u32(&packet[4..8]);
        self.table.transform(ssrc, packet)
    }
}

/// The four transformers produced by a completed DTLS-SRTP handshake.
#[derive(Clone)]
pub struct SrtpTransformers {
    pub rtp_encoder: Arc<dyn PacketTransformer>,
    pub rtp_decoder: Arc<dyn PacketTransformer>,
    pub rtcp_encoder: Arc<dyn PacketTransformer>,
    pub rtcp_decoder: Arc<dyn PacketTransformer>,
}

impl std::fmt::Debug for SrtpTransformers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SrtpTransformers { .. }")
    }
}

impl SrtpTransformers {
    /// Builds one outbound and one inbound template per protocol from the
    /// exported key material.
    pub fn from_session(config: &SrtpSessionConfig, logger: Arc<dyn LogSink>) -> Result<Self, SrtpError> {
        let rtp_policy = config.profile.rtp_policy();
        let rtcp_policy = config.profile.rtcp_policy();

        let rtp_out = SrtpCryptoContext::new(logger.clone(), 0, 0, 0, &config.outbound, rtp_policy)?;
        let rtp_in = SrtpCryptoContext::new(logger.clone(), 0, 0, 0, &config.inbound, rtp_policy)?;
        let rtcp_out = SrtcpCryptoContext::new(logger.clone(), 0, 0, &config.outbound, rtcp_policy)?;
        let rtcp_in = SrtcpCryptoContext::new(logger.clone(), 0, 0, &config.inbound, rtcp_policy)?;

        Ok(Self {
            rtp_encoder: Arc::new(SrtpTransformer::new(rtp_out, Direction::Encode, logger.clone())),
            rtp_decoder: Arc::new(SrtpTransformer::new(rtp_in, Direction::Decode, logger.clone())),
            rtcp_encoder: Arc::new(SrtcpTransformer::new(rtcp_out, Direction::Encode, logger.clone())),
            rtcp_decoder: Arc::new(SrtcpTransformer::new(rtcp_in, Direction::Decode, logger)),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::NoopLogSink;
    use crate::srtp::{SrtpEndpointKeys, SrtpProfile};

    fn pair() -> (SrtpTransformers, SrtpTransformers) {
        let a = SrtpEndpointKeys {
            master_key: vec![1; 16],
            master_salt: vec![2; 14],
        };
        let b = SrtpEndpointKeys {
            master_key: vec![3; 16],
            master_salt: vec![4; 14],
        };
        let client = SrtpSessionConfig {
            profile: SrtpProfile::Aes128CmHmacSha1_80,
            outbound: a.clone(),
            inbound: b.clone(),
        };
        let server = SrtpSessionConfig {
            profile: SrtpProfile::Aes128CmHmacSha1_80,
            outbound: b,
            inbound: a,
        };
        let log: Arc<dyn LogSink> = Arc::new(NoopLogSink);
        (
            SrtpTransformers::from_session(&client, log.clone()).unwrap(),
            SrtpTransformers::from_session(&server, log).unwrap(),
        )
    }

    fn rtp(ssrc: u32, seq: u16) -> Vec<u8> {
        let mut p = vec![0x80, 111];
        p.extend_from_slice(&seq.to_be_bytes());
        p.extend_from_slice(&[0, 0, 0, 1]);
        p.extend_from_slice(&ssrc.to_be_bytes());
        p.extend_from_slice(b"audio");
        p
    }

    fn keys(k: u8, s: u8) -> SrtpEndpointKeys {
        SrtpEndpointKeys {
            master_key: vec![k; 16],
            master_salt: vec![s; 14],
        }
    }

    fn rtp_pair() -> (SrtpTransformer, SrtpTransformer) {
        let log: Arc<dyn LogSink> = Arc::new(NoopLogSink);
        let policy = SrtpProfile::Aes128CmHmacSha1_80.rtp_policy();
        let template = |log: &Arc<dyn LogSink>| SrtpCryptoContext::new(log.clone(), 0, 0, 0, &keys(5, 6), policy).unwrap();
        (
            SrtpTransformer::new(template(&log), Direction::Encode, log.clone()),
            SrtpTransformer::new(template(&log), Direction::Decode, log),
        )
    }

    fn rtcp_decoder() -> SrtcpTransformer {
        let log: Arc<dyn LogSink> = Arc::new(NoopLogSink);
        let policy = SrtpProfile::Aes128CmHmacSha1_80.rtcp_policy();
        let template = SrtcpCryptoContext::new(log.clone(), 0, 0, &keys(5, 6), policy).unwrap();
        SrtcpTransformer::new(template, Direction::Decode, log)
    }

    #[test]
    fn forged_rtp_leaves_no_decoder_state() {
        let (_encoder, decoder) = rtp_pair();
        for ssrc in 0..1000u32 {
            let mut pkt = rtp(ssrc, 1);
            pkt.extend_from_slice(&[0xAB; 10]);
            assert_eq!(decoder.transform(&mut pkt), Err(SrtpError::AuthFailed));
        }
        assert_eq!(decoder.context_count(), 0);
    }

    #[test]
    fn forged_rtcp_leaves_no_decoder_state() {
        let decoder = rtcp_decoder();
        for ssrc in 0..1000u32 {
            let mut pkt = vec![0x80, 200, 0, 1];
            pkt.extend_from_slice(&ssrc.to_be_bytes());
            pkt.extend_from_slice(&[0x80, 0, 0, 1]);
            pkt.extend_from_slice(&[0xCD; 10]);
            assert_eq!(decoder.transform(&mut pkt), Err(SrtpError::AuthFailed));
        }
        assert_eq!(decoder.context_count(), 0);
    }

    #[test]
    fn authenticated_packet_creates_decoder_context() {
        let (encoder, decoder) = rtp_pair();
        let mut pkt = rtp(77, 10);
        encoder.transform(&mut pkt).unwrap();
        let mut forged = pkt.clone();
        let last = forged.len() - 1;
        forged[last] ^= 0xFF;
        assert_eq!(decoder.transform(&mut forged), Err(SrtpError::AuthFailed));
        assert_eq!(decoder.context_count(), 0);

        decoder.transform(&mut pkt).unwrap();
        assert_eq!(decoder.context_count(), 1);
        assert_eq!(encoder.context_count(), 1);
    }

    #[test]
    fn new_ssrcs_are_refused_past_the_limit() {
        let (encoder, decoder) = rtp_pair();
        for ssrc in 0..MAX_SSRC_CONTEXTS as u32 {
            let mut pkt = rtp(ssrc, 1);
            encoder.transform(&mut pkt).unwrap();
            decoder.transform(&mut pkt).unwrap();
        }
        assert_eq!(decoder.context_count(), MAX_SSRC_CONTEXTS);

        let extra = MAX_SSRC_CONTEXTS as u32;
        let mut pkt = rtp(extra, 1);
        assert_eq!(
            encoder.transform(&mut pkt),
            Err(SrtpError::TooManySsrcs(MAX_SSRC_CONTEXTS))
        );

        // known SSRCs keep flowing
        let mut pkt = rtp(3, 2);
        encoder.transform(&mut pkt).unwrap();
        decoder.transform(&mut pkt).unwrap();
        assert_eq!(decoder.context_count(), MAX_SSRC_CONTEXTS);
    }

    #[test]
    fn mirrored_sessions_interoperate() {
        let (client, server) = pair();
        let original = rtp(42, 1);
        let mut pkt = original.clone();
        client.rtp_encoder.transform(&mut pkt).unwrap();
        server.rtp_decoder.transform(&mut pkt).unwrap();
        assert_eq!(pkt, original);

        let rtcp_original = vec![0x80, 200, 0, 1, 0, 0, 0, 9];
        let mut rtcp = rtcp_original.clone();
        server.rtcp_encoder.transform(&mut rtcp).unwrap();
        client.rtcp_decoder.transform(&mut rtcp).unwrap();
        assert_eq!(rtcp, rtcp_original);
    }

    #[test]
    fn same_direction_keys_do_not_decrypt() {
        let (client, _server) = pair();
        let mut pkt = rtp(42, 1);
        client.rtp_encoder.transform(&mut pkt).unwrap();
        assert_eq!(client.rtp_decoder.transform(&mut pkt), Err(SrtpError::AuthFailed));
    }

    #[test]
    fn each_ssrc_has_independent_replay_state() {
        let (client, server) = pair();
        for ssrc in [7u32, 8] {
            let mut pkt = rtp(ssrc, 500);
            client.rtp_encoder.transform(&mut pkt).unwrap();
            server.rtp_decoder.transform(&mut pkt).unwrap();
        }
    }
}

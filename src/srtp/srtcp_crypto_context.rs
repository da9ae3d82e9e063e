use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};

use crate::log::log_sink::LogSink;
use crate::srtp::{
    SrtpEndpointKeys,
    constants::{RTCP_HEADER_LEN, SRTCP_E_FLAG, SRTCP_INDEX_LEN, SRTCP_INDEX_MASK},
    replay_window::{ReplayStatus, ReplayWindow},
    session_keys::SessionKeys,
    srtp_error::SrtpError,
    srtp_policy::{AuthAlgorithm, EncryptionAlgorithm, SrtpPolicy},
    utils::{
        SRTCP_LABELS, aes_cm_crypt, aes_f8_crypt, check_master_material, compute_iv,
        constant_time_eq, derive_session_keys, hmac_sha1, srtcp_f8_iv,
    },
};
use crate::{sink_debug, sink_trace, sink_warn};

/// Per-SSRC SRTCP state (RFC 3711 §3.4).
///
/// Outbound packets carry an explicit 31-bit index, so there is no rollover
/// estimation; the replay window runs directly on the received index.
pub struct SrtcpCryptoContext {
    logger: Arc<dyn LogSink>,
    ssrc: u32,
    sent_index: u32,
    received_index: u32,
    received_set: bool,
    replay: ReplayWindow,
    key_derivation_rate: u64,
    master_key: Vec<u8>,
    master_salt: Vec<u8>,
    session_keys: Option<SessionKeys>,
    policy: SrtpPolicy,
}

impl SrtcpCryptoContext {
    pub fn new(
        logger: Arc<dyn LogSink>,
        ssrc: u32,
        key_derivation_rate: u64,
        master: &SrtpEndpointKeys,
        policy: SrtpPolicy,
    ) -> Result<Self, SrtpError> {
        check_master_material(&master.master_key, &master.master_salt)?;
        Ok(Self {
            logger,
            ssrc,
            sent_index: 0,
            received_index: 0,
            received_set: false,
            replay: ReplayWindow::new(),
            key_derivation_rate,
            master_key: master.master_key.clone(),
            master_salt: master.master_salt.clone(),
            session_keys: None,
            policy,
        })
    }

    #[must_use]
    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    #[must_use]
    pub fn is_derived(&self) -> bool {
        self.session_keys.is_some()
    }

    pub fn derive_context(&self, ssrc: u32, key_derivation_rate: u64) -> Result<Self, SrtpError> {
        if self.is_derived() {
            return Err(SrtpError::AlreadyDerived);
        }
        Self::new(
            self.logger.clone(),
            ssrc,
            key_derivation_rate,
            &SrtpEndpointKeys {
                master_key: self.master_key.clone(),
                master_salt: self.master_salt.clone(),
            },
            self.policy,
        )
    }

    pub fn derive_srtcp_keys(&mut self, index: u64) -> Result<(), SrtpError> {
        if self.is_derived() {
            return Err(SrtpError::AlreadyDerived);
        }
        let r = match self.key_derivation_rate {
            0 => 0,
            kdr => index / kdr,
        };
        let keys = derive_session_keys(&self.master_key, &self.master_salt, SRTCP_LABELS, r)?;
        self.master_key.fill(0);
        self.master_salt.fill(0);
        self.session_keys = Some(keys);
        sink_debug!(self.logger, "[SRTCP] session keys derived for SSRC={:#010x}", self.ssrc);
        Ok(())
    }

    /// Encrypts an outgoing compound RTCP packet and appends `E || index` and the tag.
    pub fn transform_packet(&mut self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        if packet.len() < RTCP_HEADER_LEN {
            return Err(SrtpError::TooShort(packet.len()));
        }
        let keys = self.session_keys.as_ref().ok_or(SrtpError::NotDerived)?;

        let index = self.sent_index;
        let encrypted = self.policy.encryption != EncryptionAlgorithm::Null;
        let e_and_index = if encrypted { SRTCP_E_FLAG | index } else { index };

        if encrypted {
            apply_cipher(self.policy, keys, packet, index, e_and_index)?;
        }
        packet.extend_from_slice(&e_and_index.to_be_bytes());

        if self.policy.auth == AuthAlgorithm::HmacSha1 {
            let tag = hmac_sha1(&keys.auth_key, &[packet.as_slice()])?;
            packet.extend_from_slice(&tag[..self.policy.auth_tag_len]);
        }

        self.sent_index = (index + 1) & SRTCP_INDEX_MASK;
        sink_trace!(self.logger, "[SRTCP] protected SSRC={:#010x} index={}", self.ssrc, index);
        Ok(())
    }

    pub fn reverse_transform_packet(&mut self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        let tag_len = self.policy.tag_len();
        if packet.len() < RTCP_HEADER_LEN + SRTCP_INDEX_LEN + tag_len {
            return Err(SrtpError::TooShort(packet.len()));
        }
        let keys = self.session_keys.as_ref().ok_or(SrtpError::NotDerived)?;

        let tag_start = packet.len() - tag_len;
        let index_start = tag_start - SRTCP_INDEX_LEN;
        let e_and_index = BigEndian::read_u32(&packet[index_start..tag_start]);
        let index = e_and_index & SRTCP_INDEX_MASK;

        let highest = if self.received_set { self.received_index } else { index };
        let delta = i64::from(index) - i64::from(highest);
        match self.replay.check(delta) {
            ReplayStatus::Accepted => {}
            ReplayStatus::Duplicate => {
                sink_warn!(
                    self.logger,
                    "[SRTCP] replay detected: SSRC={:#010x} index={}",
                    self.ssrc,
                    index
                );
                return Err(SrtpError::Replay(i64::from(index)));
            }
            ReplayStatus::TooOld => return Err(SrtpError::TooOld(i64::from(index))),
        }

        if self.policy.auth == AuthAlgorithm::HmacSha1 {
            let (content, received_tag) = packet.split_at(tag_start);
            let computed = hmac_sha1(&keys.auth_key, &[content])?;
            if !constant_time_eq(&computed[..tag_len], received_tag) {
                sink_debug!(
                    self.logger,
                    "[SRTCP] auth failed: SSRC={:#010x} index={}",
                    self.ssrc,
                    index
                );
                return Err(SrtpError::AuthFailed);
            }
        }

        packet.truncate(index_start);
        if e_and_index & SRTCP_E_FLAG != 0 && self.policy.encryption != EncryptionAlgorithm::Null {
            apply_cipher(self.policy, keys, packet, index, e_and_index)?;
        }

        self.replay.update(delta);
        if delta > 0 || !self.received_set {
            self.received_index = index;
            self.received_set = true;
        }
        Ok(())
    }
}

fn apply_cipher(
    policy: SrtpPolicy,
    keys: &SessionKeys,
    packet: &mut [u8],
    index: u32,
    e_and_index: u32,
) -> Result<(), SrtpError> {
    match policy.encryption {
        EncryptionAlgorithm::Null => Ok(()),
        EncryptionAlgorithm::AesCm => {
            let ssrc = BigEndian::read_u32(&packet[4..8]);
            let iv = compute_iv(&keys.salt, ssrc, u64::from(index));
            aes_cm_crypt(&keys.enc_key, &iv, &mut packet[RTCP_HEADER_LEN..])
        }
        EncryptionAlgorithm::AesF8 => {
            let iv = srtcp_f8_iv(e_and_index, packet);
            aes_f8_crypt(&keys.enc_key, &keys.salt, &iv, &mut packet[RTCP_HEADER_LEN..])
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::NoopLogSink;

    fn derived(policy: SrtpPolicy) -> SrtcpCryptoContext {
        let master = SrtpEndpointKeys {
            master_key: vec![0x11; 16],
            master_salt: vec![0x22; 14],
        };
        let template = SrtcpCryptoContext::new(Arc::new(NoopLogSink), 0, 0, &master, policy).unwrap();
        let mut ctx = template.derive_context(0xCAFE_BABE, 0).unwrap();
        ctx.derive_srtcp_keys(0).unwrap();
        ctx
    }

    /// Receiver report with one report block.
    fn receiver_report() -> Vec<u8> {
        let mut p = vec![0x81, 201, 0x00, 0x07];
        p.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
        p.extend_from_slice(&0x0102_0304u32.to_be_bytes());
        p.extend_from_slice(&[0x10, 0, 0, 5]);
        p.extend_from_slice(&[0u8; 16]);
        p
    }

    #[test]
    fn round_trip_and_index_trailer() {
        for policy in [
            SrtpPolicy::AES_CM_128_HMAC_SHA1_80,
            SrtpPolicy::AES_F8_128_HMAC_SHA1_80,
            SrtpPolicy::NULL_HMAC_SHA1_80,
        ] {
            let mut tx = derived(policy);
            let mut rx = derived(policy);
            for expected_index in 0u32..3 {
                let original = receiver_report();
                let mut pkt = original.clone();
                tx.transform_packet(&mut pkt).unwrap();

                let trailer = &pkt[original.len()..original.len() + 4];
                let word = BigEndian::read_u32(trailer);
                assert_eq!(word & SRTCP_INDEX_MASK, expected_index);
                assert_eq!(
                    word & SRTCP_E_FLAG != 0,
                    policy.encryption != EncryptionAlgorithm::Null
                );
                // header and sender SSRC stay in the clear
                assert_eq!(&pkt[..8], &original[..8]);

                rx.reverse_transform_packet(&mut pkt).unwrap();
                assert_eq!(pkt, original);
            }
        }
    }

    #[test]
    fn tampering_and_replay_are_rejected() {
        let mut tx = derived(SrtpPolicy::AES_CM_128_HMAC_SHA1_80);
        let mut rx = derived(SrtpPolicy::AES_CM_128_HMAC_SHA1_80);
        let mut pkt = receiver_report();
        tx.transform_packet(&mut pkt).unwrap();

        let mut tampered = pkt.clone();
        tampered[10] ^= 0xFF;
        assert_eq!(rx.reverse_transform_packet(&mut tampered), Err(SrtpError::AuthFailed));

        let mut copy = pkt.clone();
        rx.reverse_transform_packet(&mut pkt).unwrap();
        assert!(matches!(
            rx.reverse_transform_packet(&mut copy),
            Err(SrtpError::Replay(0))
        ));
    }

    #[test]
    fn too_short_is_rejected() {
        let mut rx = derived(SrtpPolicy::AES_CM_128_HMAC_SHA1_80);
        let mut pkt = vec![0x81, 201, 0, 1, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            rx.reverse_transform_packet(&mut pkt),
            Err(SrtpError::TooShort(_))
        ));
    }
}

use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};

use crate::log::log_sink::LogSink;
use crate::srtp::{
    SrtpEndpointKeys,
    constants::SEQ_HALF,
    replay_window::{ReplayStatus, ReplayWindow},
    session_keys::SessionKeys,
    srtp_error::SrtpError,
    srtp_policy::{AuthAlgorithm, EncryptionAlgorithm, SrtpPolicy},
    utils::{
        SRTP_LABELS, aes_cm_crypt, aes_f8_crypt, check_master_material, compute_iv,
        constant_time_eq, derive_session_keys, get_rtp_header_len, hmac_sha1, srtp_f8_iv,
    },
};
use crate::{sink_debug, sink_trace, sink_warn};

/// Per-SSRC SRTP state: session keys, rollover counter and replay window.
///
/// A context is either a *template* (master material present, no session keys)
/// or a *derived* context (session keys present, master material zeroed).
/// Templates are turned into per-SSRC contexts with [`derive_context`].
///
/// [`derive_context`]: SrtpCryptoContext::derive_context
pub struct SrtpCryptoContext {
    logger: Arc<dyn LogSink>,
    ssrc: u32,
    roc: u32,
    guessed_roc: i64,
    seq_num: u16,
    seq_num_set: bool,
    replay: ReplayWindow,
    key_derivation_rate: u64,
    master_key: Vec<u8>,
    master_salt: Vec<u8>,
    session_keys: Option<SessionKeys>,
    policy: SrtpPolicy,
}

impl SrtpCryptoContext {
    pub fn new(
        logger: Arc<dyn LogSink>,
        ssrc: u32,
        roc: u32,
        key_derivation_rate: u64,
        master: &SrtpEndpointKeys,
        policy: SrtpPolicy,
    ) -> Result<Self, SrtpError> {
        check_master_material(&master.master_key, &master.master_salt)?;
        Ok(Self {
            logger,
            ssrc,
            roc,
            guessed_roc: i64::from(roc),
            seq_num: 0,
            seq_num_set: false,
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
    pub fn roc(&self) -> u32 {
        self.roc
    }

    #[must_use]
    pub fn policy(&self) -> SrtpPolicy {
        self.policy
    }

    #[must_use]
    pub fn is_derived(&self) -> bool {
        self.session_keys.is_some()
    }

    /// Fresh context for `ssrc` with the same master material and policy but
    /// independent ROC and replay state.
    pub fn derive_context(&self, ssrc: u32, roc: u32, key_derivation_rate: u64) -> Result<Self, SrtpError> {
        if self.is_derived() {
            return Err(SrtpError::AlreadyDerived);
        }
        Self::new(
            self.logger.clone(),
            ssrc,
            roc,
            key_derivation_rate,
            &SrtpEndpointKeys {
                master_key: self.master_key.clone(),
                master_salt: self.master_salt.clone(),
            },
            self.policy,
        )
    }

    /// Derives the session keys for `index` and zeroes the master material.
    pub fn derive_srtp_keys(&mut self, index: u64) -> Result<(), SrtpError> {
        if self.is_derived() {
            return Err(SrtpError::AlreadyDerived);
        }
        let r = match self.key_derivation_rate {
            0 => 0,
            kdr => index / kdr,
        };
        let keys = derive_session_keys(&self.master_key, &self.master_salt, SRTP_LABELS, r)?;
        self.master_key.fill(0);
        self.master_salt.fill(0);
        self.session_keys = Some(keys);

        sink_debug!(
            self.logger,
            "[SRTP] session keys derived for SSRC={:#010x} policy={:?}",
            self.ssrc,
            self.policy.encryption
        );
        Ok(())
    }

    /// Protects an outgoing RTP packet in place and appends the auth tag.
    pub fn transform_packet(&mut self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        let header_len = get_rtp_header_len(packet)?;
        let keys = self.session_keys.as_ref().ok_or(SrtpError::NotDerived)?;

        let seq = BigEndian::read_u16(&packet[2..4]);
        let roc = self.roc;
        let index = (u64::from(roc) << 16) | u64::from(seq);

        apply_cipher(self.policy, keys, packet, header_len, index, roc)?;

        if self.policy.auth == AuthAlgorithm::HmacSha1 {
            let tag = hmac_sha1(&keys.auth_key, &[packet.as_slice(), roc.to_be_bytes().as_slice()])?;
            packet.extend_from_slice(&tag[..self.policy.auth_tag_len]);
        }

        if seq == u16::MAX {
            self.roc = self.roc.wrapping_add(1);
        }

        sink_trace!(
            self.logger,
            "[SRTP] protected SSRC={:#010x} seq={} roc={} len={}",
            self.ssrc,
            seq,
            roc,
            packet.len()
        );
        Ok(())
    }

    /// Authenticates, replay-checks and decrypts an incoming SRTP packet in place.
    ///
    /// State (ROC, highest sequence number, replay window) changes only when
    /// every check passes.
    pub fn reverse_transform_packet(&mut self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        let tag_len = self.policy.tag_len();
        if packet.len() < tag_len {
            return Err(SrtpError::TooShort(packet.len()));
        }
        let content_len = packet.len() - tag_len;
        let header_len = get_rtp_header_len(&packet[..content_len])?;
        if self.session_keys.is_none() {
            return Err(SrtpError::NotDerived);
        }

        let seq = BigEndian::read_u16(&packet[2..4]);
        // the first packet seeds the highest sequence number, but only once accepted
        let s_l = if self.seq_num_set { self.seq_num } else { seq };

        let guessed_index = self.guess_index_from(s_l, seq);
        let guessed_roc = self.guessed_roc;
        let delta = guessed_index - ((i64::from(self.roc) << 16) | i64::from(s_l));

        match self.replay.check(delta) {
            ReplayStatus::Accepted => {}
            ReplayStatus::Duplicate => {
                sink_warn!(
                    self.logger,
                    "[SRTP] replay detected: SSRC={:#010x} seq={} index={}",
                    self.ssrc,
                    seq,
                    guessed_index
                );
                return Err(SrtpError::Replay(guessed_index));
            }
            ReplayStatus::TooOld => return Err(SrtpError::TooOld(guessed_index)),
        }
        let index = u64::try_from(guessed_index).map_err(|_| SrtpError::TooOld(guessed_index))?;
        let roc_for_auth = u32::try_from(guessed_roc).map_err(|_| SrtpError::TooOld(guessed_index))?;

        let keys = self.session_keys.as_ref().ok_or(SrtpError::NotDerived)?;

        if self.policy.auth == AuthAlgorithm::HmacSha1 {
            let (content, received_tag) = packet.split_at(content_len);
            let computed = hmac_sha1(&keys.auth_key, &[content, roc_for_auth.to_be_bytes().as_slice()])?;
            if !constant_time_eq(&computed[..tag_len], received_tag) {
                sink_debug!(
                    self.logger,
                    "[SRTP] auth failed: SSRC={:#010x} seq={} roc={}",
                    self.ssrc,
                    seq,
                    guessed_roc
                );
                return Err(SrtpError::AuthFailed);
            }
        }

        packet.truncate(content_len);
        apply_cipher(self.policy, keys, packet, header_len, index, roc_for_auth)?;

        self.update(seq, delta);

        sink_trace!(
            self.logger,
            "[SRTP] unprotected SSRC={:#010x} seq={} roc={}",
            self.ssrc,
            seq,
            self.roc
        );
        Ok(())
    }

    #[cfg(test)]
    fn guess_index(&mut self, seq: u16) -> i64 {
        self.guess_index_from(self.seq_num, seq)
    }

    /// Picks the ROC that puts `seq` closest to the highest accepted sequence number `s_l`.
    fn guess_index_from(&mut self, s_l: u16, seq: u16) -> i64 {
        let roc = i64::from(self.roc);
        self.guessed_roc = if s_l < SEQ_HALF {
            if i32::from(seq) - i32::from(s_l) > i32::from(SEQ_HALF) {
                roc - 1
            } else {
                roc
            }
        } else if s_l - SEQ_HALF > seq {
            roc + 1
        } else {
            roc
        };
        (self.guessed_roc << 16) | i64::from(seq)
    }

    fn update(&mut self, seq: u16, delta: i64) {
        self.replay.update(delta);

        let roc = i64::from(self.roc);
        if !self.seq_num_set {
            self.seq_num_set = true;
            self.seq_num = seq;
        } else if self.guessed_roc == roc {
            if seq > self.seq_num {
                self.seq_num = seq;
            }
        } else if self.guessed_roc == roc + 1 {
            self.seq_num = seq;
            self.roc = self.roc.wrapping_add(1);
        }
    }
}

fn apply_cipher(
    policy: SrtpPolicy,
    keys: &SessionKeys,
    packet: &mut [u8],
    header_len: usize,
    index: u64,
    roc: u32,
) -> Result<(), SrtpError> {
    match policy.encryption {
        EncryptionAlgorithm::Null => Ok(()),
        EncryptionAlgorithm::AesCm => {
            let ssrc = BigEndian::read_u32(&packet[8..12]);
            let iv = compute_iv(&keys.salt, ssrc, index);
            aes_cm_crypt(&keys.enc_key, &iv, &mut packet[header_len..])
        }
        EncryptionAlgorithm::AesF8 => {
            let iv = srtp_f8_iv(packet, roc);
            aes_f8_crypt(&keys.enc_key, &keys.salt, &iv, &mut packet[header_len..])
        }
    }
}

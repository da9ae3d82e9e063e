pub(super) type HmacSha1 = Hmac<Sha1>;
pub(super) type Aes128Ctr = Ctr128BE<Aes128>;

use aes::Aes128;
use aes::cipher::{BlockEncrypt, KeyInit, KeyIvInit, StreamCipher};
use byteorder::{BigEndian, ByteOrder};
use ctr::Ctr128BE;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::srtp::{
    constants::{
        MASTER_KEY_LEN, MASTER_SALT_LEN, RTP_HEADER_LEN, SESSION_AUTH_LEN, SESSION_KEY_LEN,
        SESSION_SALT_LEN, SRTCP_LABEL_AUTH, SRTCP_LABEL_ENCRYPTION, SRTCP_LABEL_SALT,
        SRTP_LABEL_AUTH, SRTP_LABEL_ENCRYPTION, SRTP_LABEL_SALT,
    },
    session_keys::SessionKeys,
    srtp_error::SrtpError,
};

#[derive(Debug, Clone, Copy)]
pub(super) struct KeyLabels {
    pub(super) encryption: u8,
    pub(super) auth: u8,
    pub(super) salt: u8,
}

pub(super) const SRTP_LABELS: KeyLabels = KeyLabels {
    encryption: SRTP_LABEL_ENCRYPTION,
    auth: SRTP_LABEL_AUTH,
    salt: SRTP_LABEL_SALT,
};

pub(super) const SRTCP_LABELS: KeyLabels = KeyLabels {
    encryption: SRTCP_LABEL_ENCRYPTION,
    auth: SRTCP_LABEL_AUTH,
    salt: SRTCP_LABEL_SALT,
};

/// Simple constant-time comparison to avoid timing attacks.
/// (Standard in crypto impls to avoid leaking where the first byte mismatch occurred)
pub(super) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

pub(super) fn check_master_material(key: &[u8], salt: &[u8]) -> Result<(), SrtpError> {
    if key.len() != MASTER_KEY_LEN {
        return Err(SrtpError::InvalidKey("master key must be 16 bytes"));
    }
    if salt.len() != MASTER_SALT_LEN {
        return Err(SrtpError::InvalidKey("master salt must be 14 bytes"));
    }
    Ok(())
}

/// Runs the AES-CM key derivation for all three session keys.
///
/// `r` is `index / key_derivation_rate` (0 when the rate is 0).
pub(super) fn derive_session_keys(
    master_key: &[u8],
    master_salt: &[u8],
    labels: KeyLabels,
    r: u64,
) -> Result<SessionKeys, SrtpError> {
    let mut enc_key = [0u8; SESSION_KEY_LEN];
    let mut auth_key = [0u8; SESSION_AUTH_LEN];
    let mut salt = [0u8; SESSION_SALT_LEN];

    aes_cm_prf(master_key, master_salt, labels.encryption, r, &mut enc_key)?;
    aes_cm_prf(master_key, master_salt, labels.auth, r, &mut auth_key)?;
    aes_cm_prf(master_key, master_salt, labels.salt, r, &mut salt)?;

    Ok(SessionKeys {
        enc_key,
        auth_key,
        salt,
    })
}

/// RFC 3711 §4.3.1: `x = (label || r) XOR master_salt`, keystream from `IV = x * 2^16`.
pub(super) fn aes_cm_prf(
    master_key: &[u8],
    master_salt: &[u8],
    label: u8,
    r: u64,
    out: &mut [u8],
) -> Result<(), SrtpError> {
    check_master_material(master_key, master_salt)?;

    let mut iv = [0u8; 16];
    iv[..MASTER_SALT_LEN].copy_from_slice(master_salt);
    iv[7] ^= label;
    let r_bytes = r.to_be_bytes();
    for (dst, src) in iv[8..14].iter_mut().zip(&r_bytes[2..]) {
        *dst ^= src;
    }

    let mut cipher = Aes128Ctr::new_from_slices(master_key, &iv)
        .map_err(|_| SrtpError::InvalidKey("bad AES-CM key length"))?;
    out.fill(0);
    cipher.apply_keystream(out);
    Ok(())
}

/// Counter-mode IV: `(k_s * 2^16) XOR (SSRC * 2^64) XOR (index * 2^16)`.
pub(super) fn compute_iv(session_salt: &[u8; SESSION_SALT_LEN], ssrc: u32, index: u64) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..14].copy_from_slice(session_salt);

    let ssrc_bytes = ssrc.to_be_bytes();
    for i in 0..4 {
        iv[4 + i] ^= ssrc_bytes[i];
    }

    let idx_full = index.to_be_bytes();
    for i in 0..6 {
        iv[8 + i] ^= idx_full[2 + i];
    }
    iv
}

pub(super) fn aes_cm_crypt(
    enc_key: &[u8],
    iv: &[u8; 16],
    data: &mut [u8],
) -> Result<(), SrtpError> {
    let mut cipher = Aes128Ctr::new_from_slices(enc_key, iv)
        .map_err(|_| SrtpError::InvalidKey("bad AES-CM key length"))?;
    cipher.apply_keystream(data);
    Ok(())
}

/// f8 IV for SRTP: `0x00 || M | PT || SEQ || TS || SSRC || ROC`.
pub(super) fn srtp_f8_iv(header: &[u8], roc: u32) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[1..12].copy_from_slice(&header[1..RTP_HEADER_LEN]);
    BigEndian::write_u32(&mut iv[12..16], roc);
    iv
}

/// f8 IV for SRTCP: `0^32 || E || index || V | P | RC || PT || length || SSRC`.
pub(super) fn srtcp_f8_iv(e_and_index: u32, header: &[u8]) -> [u8; 16] {
    let mut iv = [0u8; 16];
    BigEndian::write_u32(&mut iv[4..8], e_and_index);
    iv[8..16].copy_from_slice(&header[..8]);
    iv
}

/// AES f8 mode (RFC 3711 §4.1.2). Encryption and decryption are the same operation.
///
/// `IV' = E(k_e XOR m, IV)` with `m = k_s || 0x55..`, then
/// `S(j) = E(k_e, IV' XOR j XOR S(j-1))`.
pub(super) fn aes_f8_crypt(
    enc_key: &[u8],
    salt: &[u8],
    iv: &[u8; 16],
    data: &mut [u8],
) -> Result<(), SrtpError> {
    if enc_key.len() != 16 {
        return Err(SrtpError::InvalidKey("bad AES-f8 key length"));
    }
    let mut mask = [0x55u8; 16];
    let n = salt.len().min(16);
    mask[..n].copy_from_slice(&salt[..n]);

    let mut masked_key = [0u8; 16];
    for ((m, k), s) in masked_key.iter_mut().zip(enc_key).zip(mask.iter()) {
        *m = k ^ s;
    }

    let iv_cipher = Aes128::new_from_slice(&masked_key)
        .map_err(|_| SrtpError::InvalidKey("bad AES-f8 key length"))?;
    masked_key.fill(0);
    let mut iv_prime = aes::Block::from(*iv);
    iv_cipher.encrypt_block(&mut iv_prime);

    let cipher = Aes128::new_from_slice(enc_key)
        .map_err(|_| SrtpError::InvalidKey("bad AES-f8 key length"))?;

    let mut stream = [0u8; 16];
    for (j, chunk) in data.chunks_mut(16).enumerate() {
        let counter = (j as u128).to_be_bytes();
        let mut block = [0u8; 16];
        for i in 0..16 {
            block[i] = iv_prime[i] ^ counter[i] ^ stream[i];
        }
        let mut block = aes::Block::from(block);
        cipher.encrypt_block(&mut block);
        stream.copy_from_slice(&block);

        for (d, k) in chunk.iter_mut().zip(stream.iter()) {
            *d ^= k;
        }
    }
    Ok(())
}

/// Full 20-byte HMAC-SHA1 over the concatenation of `parts`.
pub(super) fn hmac_sha1(auth_key: &[u8], parts: &[&[u8]]) -> Result<[u8; 20], SrtpError> {
    let mut mac = <HmacSha1 as Mac>::new_from_slice(auth_key)
        .map_err(|_| SrtpError::InvalidKey("invalid auth key length"))?;
    for part in parts {
        mac.update(part);
    }
    let digest = mac.finalize().into_bytes();
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    Ok(out)
}

pub(super) fn get_rtp_header_len(packet: &[u8]) -> Result<usize, SrtpError> {
    if packet.len() < RTP_HEADER_LEN {
        return Err(SrtpError::TooShort(packet.len()));
    }
    let v_p_x_cc = packet[0];
    if v_p_x_cc >> 6 != 2 {
        return Err(SrtpError::BadHeader("not RTP version 2"));
    }
    let cc = v_p_x_cc & 0x0F;
    let x = (v_p_x_cc & 0x10) != 0;

    let mut len = RTP_HEADER_LEN + (cc as usize * 4);

    if x {
        if packet.len() < len + 4 {
            return Err(SrtpError::BadHeader("too short for extension header"));
        }
        let ext_len = BigEndian::read_u16(&packet[len + 2..len + 4]);
        len += 4 + (ext_len as usize * 4);
    }

    if packet.len() < len {
        return Err(SrtpError::BadHeader("packet smaller than header"));
    }
    Ok(len)
}

#[cfg(test)]
pub(crate) fn hex(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap_or(0))
        .collect()
}

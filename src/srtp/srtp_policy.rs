use crate::srtp::{
    constants::{AUTH_TAG_LEN_32, AUTH_TAG_LEN_80, SESSION_AUTH_LEN, SESSION_KEY_LEN, SESSION_SALT_LEN},
    srtp_error::SrtpError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionAlgorithm {
    Null,
    /// AES in counter mode (RFC 3711 §4.1.1).
    AesCm,
    /// AES in f8 mode (RFC 3711 §4.1.2).
    AesF8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAlgorithm {
    Null,
    HmacSha1,
}

/// Algorithms and lengths applied by one crypto context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SrtpPolicy {
    pub encryption: EncryptionAlgorithm,
    pub enc_key_len: usize,
    pub auth: AuthAlgorithm,
    pub auth_key_len: usize,
    pub auth_tag_len: usize,
    pub salt_key_len: usize,
}

impl SrtpPolicy {
    pub const AES_CM_128_HMAC_SHA1_80: Self = Self::new(
        EncryptionAlgorithm::AesCm,
        AuthAlgorithm::HmacSha1,
        AUTH_TAG_LEN_80,
    );
    pub const AES_CM_128_HMAC_SHA1_32: Self = Self::new(
        EncryptionAlgorithm::AesCm,
        AuthAlgorithm::HmacSha1,
        AUTH_TAG_LEN_32,
    );
    pub const AES_F8_128_HMAC_SHA1_80: Self = Self::new(
        EncryptionAlgorithm::AesF8,
        AuthAlgorithm::HmacSha1,
        AUTH_TAG_LEN_80,
    );
    pub const NULL_HMAC_SHA1_80: Self =
        Self::new(EncryptionAlgorithm::Null, AuthAlgorithm::HmacSha1, AUTH_TAG_LEN_80);
    pub const NULL_NULL: Self = Self::new(EncryptionAlgorithm::Null, AuthAlgorithm::Null, 0);

    const fn new(encryption: EncryptionAlgorithm, auth: AuthAlgorithm, auth_tag_len: usize) -> Self {
        Self {
            encryption,
            enc_key_len: SESSION_KEY_LEN,
            auth,
            auth_key_len: SESSION_AUTH_LEN,
            auth_tag_len,
            salt_key_len: SESSION_SALT_LEN,
        }
    }

    /// Bytes appended to every protected packet (0 without authentication).
    #[must_use]
    pub fn tag_len(&self) -> usize {
        match self.auth {
            AuthAlgorithm::Null => 0,
            AuthAlgorithm::HmacSha1 => self.auth_tag_len,
        }
    }
}

/// SRTP protection profiles that can be negotiated or configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrtpProfile {
    Aes128CmHmacSha1_80,
    Aes128CmHmacSha1_32,
    AesF8_128HmacSha1_80,
    NullHmacSha1_80,
    NullNull,
}

impl SrtpProfile {
    /// Policy for the RTP direction.
    #[must_use]
    pub fn rtp_policy(self) -> SrtpPolicy {
        match self {
            SrtpProfile::Aes128CmHmacSha1_80 => SrtpPolicy::AES_CM_128_HMAC_SHA1_80,
            SrtpProfile::Aes128CmHmacSha1_32 => SrtpPolicy::AES_CM_128_HMAC_SHA1_32,
            SrtpProfile::AesF8_128HmacSha1_80 => SrtpPolicy::AES_F8_128_HMAC_SHA1_80,
            SrtpProfile::NullHmacSha1_80 => SrtpPolicy::NULL_HMAC_SHA1_80,
            SrtpProfile::NullNull => SrtpPolicy::NULL_NULL,
        }
    }

    /// Policy for SRTCP. The `_32` profile keeps an 80-bit tag on RTCP (RFC 5764 §4.1.2).
    #[must_use]
    pub fn rtcp_policy(self) -> SrtpPolicy {
        match self {
            SrtpProfile::Aes128CmHmacSha1_32 => SrtpPolicy::AES_CM_128_HMAC_SHA1_80,
            other => other.rtp_policy(),
        }
    }

    /// Maps the profile name reported by OpenSSL's `use_srtp` extension.
    pub fn from_openssl_name(name: &str) -> Result<Self, SrtpError> {
        match name {
            "SRTP_AES128_CM_SHA1_80" => Ok(SrtpProfile::Aes128CmHmacSha1_80),
            "SRTP_AES128_CM_SHA1_32" => Ok(SrtpProfile::Aes128CmHmacSha1_32),
            other => Err(SrtpError::UnsupportedProfile(other.to_string())),
        }
    }
}

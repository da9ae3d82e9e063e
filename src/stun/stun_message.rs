use bytes::{BufMut, BytesMut};
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::stun::{
    attribute::StunAttribute,
    constants::{
        ATTR_FINGERPRINT, ATTR_HEADER_LEN, ATTR_MESSAGE_INTEGRITY, BINDING_ERROR_RESPONSE,
        BINDING_INDICATION, BINDING_REQUEST, BINDING_SUCCESS_RESPONSE, FINGERPRINT_ATTR_LEN,
        FINGERPRINT_XOR, HEADER_LEN, INTEGRITY_ATTR_LEN, MAGIC_COOKIE, TRANSACTION_ID_LEN,
        pad_size,
    },
    stun_error::StunError,
};

type HmacSha1 = Hmac<Sha1>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    BindingRequest,
    BindingIndication,
    BindingSuccess,
    BindingError,
    Other(u16),
}

impl MessageType {
    #[must_use]
    pub fn from_u16(v: u16) -> Self {
        match v {
            BINDING_REQUEST => MessageType::BindingRequest,
            BINDING_INDICATION => MessageType::BindingIndication,
            BINDING_SUCCESS_RESPONSE => MessageType::BindingSuccess,
            BINDING_ERROR_RESPONSE => MessageType::BindingError,
            other => MessageType::Other(other),
        }
    }

    #[must_use]
    pub fn as_u16(self) -> u16 {
        match self {
            MessageType::BindingRequest => BINDING_REQUEST,
            MessageType::BindingIndication => BINDING_INDICATION,
            MessageType::BindingSuccess => BINDING_SUCCESS_RESPONSE,
            MessageType::BindingError => BINDING_ERROR_RESPONSE,
            MessageType::Other(v) => v,
        }
    }
}

/// Decoded STUN message. Keeps the raw bytes so MESSAGE-INTEGRITY can be
/// checked once the caller knows which password applies.
#[derive(Debug, Clone)]
pub struct StunMessage {
    pub msg_type: MessageType,
    pub transaction_id: [u8; TRANSACTION_ID_LEN],
    pub attributes: Vec<StunAttribute>,
    raw: Vec<u8>,
    integrity_offset: Option<usize>,
}

/// Cheap check used by the demultiplexer: top bits zero and magic cookie present.
#[must_use]
pub fn looks_like_stun(buf: &[u8]) -> bool {
    buf.len() >= HEADER_LEN
        && buf[0] & 0xC0 == 0
        && u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) == MAGIC_COOKIE
}

impl StunMessage {
    /// Parses a datagram. A present FINGERPRINT is verified here; integrity is
    /// left to [`verify_integrity`](Self::verify_integrity).
    pub fn decode(buf: &[u8]) -> Result<Self, StunError> {
        if buf.len() < HEADER_LEN {
            return Err(StunError::TooShort(buf.len()));
        }
        if !looks_like_stun(buf) {
            return Err(StunError::NotStun);
        }
        let declared = usize::from(u16::from_be_bytes([buf[2], buf[3]]));
        let actual = buf.len() - HEADER_LEN;
        if declared != actual || declared % 4 != 0 {
            return Err(StunError::BadLength { declared, actual });
        }

        let msg_type = MessageType::from_u16(u16::from_be_bytes([buf[0], buf[1]]));
        let mut transaction_id = [0u8; TRANSACTION_ID_LEN];
        transaction_id.copy_from_slice(&buf[8..HEADER_LEN]);

        let mut attributes = Vec::new();
        let mut integrity_offset = None;
        let mut offset = HEADER_LEN;

        while offset < buf.len() {
            if offset + ATTR_HEADER_LEN > buf.len() {
                return Err(StunError::AttributeOverrun { attr_type: 0 });
            }
            let attr_type = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
            let len = usize::from(u16::from_be_bytes([buf[offset + 2], buf[offset + 3]]));
            let value_start = offset + ATTR_HEADER_LEN;
            let value_end = value_start + len;
            if value_end > buf.len() {
                return Err(StunError::AttributeOverrun { attr_type });
            }
            let value = &buf[value_start..value_end];

            if attr_type == ATTR_FINGERPRINT {
                let attr = StunAttribute::decode(attr_type, value, &transaction_id)?;
                if value_end != buf.len() {
                    return Err(StunError::MalformedAttribute { attr_type });
                }
                if let StunAttribute::Fingerprint(received) = attr {
                    if fingerprint(&buf[..offset]) != received {
                        return Err(StunError::FingerprintMismatch);
                    }
                }
                attributes.push(attr);
                break;
            }

            // everything after MESSAGE-INTEGRITY except FINGERPRINT is ignored
            if integrity_offset.is_none() {
                if attr_type == ATTR_MESSAGE_INTEGRITY {
                    integrity_offset = Some(offset);
                }
                attributes.push(StunAttribute::decode(attr_type, value, &transaction_id)?);
            }

            offset = value_end + pad_size(len);
        }

        Ok(Self {
            msg_type,
            transaction_id,
            attributes,
            raw: buf.to_vec(),
            integrity_offset,
        })
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.attributes.iter().find_map(|a| match a {
            StunAttribute::Username(u) => Some(u.as_str()),
            _ => None,
        })
    }

    #[must_use]
    pub fn has_integrity(&self) -> bool {
        self.integrity_offset.is_some()
    }

    #[must_use]
    pub fn has_attribute(&self, attr_type: u16) -> bool {
        self.attributes.iter().any(|a| a.attr_type() == attr_type)
    }

    #[must_use]
    pub fn error_code(&self) -> Option<(u16, &str)> {
        self.attributes.iter().find_map(|a| match a {
            StunAttribute::ErrorCode { code, reason } => Some((*code, reason.as_str())),
            _ => None,
        })
    }

    /// Recomputes HMAC-SHA1 over the message up to MESSAGE-INTEGRITY, with the
    /// header length adjusted to end at that attribute, and compares in constant time.
    #[must_use]
    pub fn verify_integrity(&self, key: &[u8]) -> bool {
        let Some(offset) = self.integrity_offset else {
            return false;
        };
        let Some(received) = self.attributes.iter().find_map(|a| match a {
            StunAttribute::MessageIntegrity(m) => Some(m),
            _ => None,
        }) else {
            return false;
        };

        let Ok(mut mac) = <HmacSha1 as Mac>::new_from_slice(key) else {
            return false;
        };
        let adjusted_len = (offset + INTEGRITY_ATTR_LEN - HEADER_LEN) as u16;
        mac.update(&self.raw[..2]);
        mac.update(&adjusted_len.to_be_bytes());
        mac.update(&self.raw[4..offset]);
        mac.verify_slice(received).is_ok()
    }
}

fn fingerprint(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes) ^ FINGERPRINT_XOR
}

/// Incremental STUN encoder. Attributes are appended in call order and the
/// header length is kept current so integrity and fingerprint cover the right bytes.
pub struct MessageBuilder {
    buf: BytesMut,
    transaction_id: [u8; TRANSACTION_ID_LEN],
}

impl MessageBuilder {
    #[must_use]
    pub fn new(msg_type: MessageType, transaction_id: [u8; TRANSACTION_ID_LEN]) -> Self {
        let mut buf = BytesMut::with_capacity(128);
        buf.put_u16(msg_type.as_u16());
        buf.put_u16(0);
        buf.put_u32(MAGIC_COOKIE);
        buf.put_slice(&transaction_id);
        Self {
            buf,
            transaction_id,
        }
    }

    /// A builder with a fresh random transaction id.
    #[must_use]
    pub fn with_random_id(msg_type: MessageType) -> Self {
        Self::new(msg_type, rand::random())
    }

    #[must_use]
    pub fn transaction_id(&self) -> [u8; TRANSACTION_ID_LEN] {
        self.transaction_id
    }

    #[must_use]
    pub fn attribute(mut self, attr: &StunAttribute) -> Self {
        let mut value = BytesMut::new();
        attr.encode_value(&self.transaction_id, &mut value);
        self.put_raw(attr.attr_type(), &value);
        self
    }

    /// Appends MESSAGE-INTEGRITY keyed with `key` (the short-term password).
    pub fn message_integrity(mut self, key: &[u8]) -> Result<Self, StunError> {
        self.set_length(self.buf.len() - HEADER_LEN + INTEGRITY_ATTR_LEN);
        let mut mac = <HmacSha1 as Mac>::new_from_slice(key).map_err(|_| StunError::InvalidKey)?;
        mac.update(&self.buf);
        let digest = mac.finalize().into_bytes();
        self.put_raw(ATTR_MESSAGE_INTEGRITY, &digest);
        Ok(self)
    }

    #[must_use]
    pub fn fingerprint(mut self) -> Self {
        self.set_length(self.buf.len() - HEADER_LEN + FINGERPRINT_ATTR_LEN);
        let crc = fingerprint(&self.buf);
        self.put_raw(ATTR_FINGERPRINT, &crc.to_be_bytes());
        self
    }

    #[must_use]
    pub fn build(self) -> Vec<u8> {
        self.buf.to_vec()
    }

    fn put_raw(&mut self, attr_type: u16, value: &[u8]) {
        self.buf.put_u16(attr_type);
        self.buf.put_u16(value.len() as u16);
        self.buf.put_slice(value);
        let pad = pad_size(value.len());
        if pad > 0 {
            self.buf.put_bytes(0, pad);
        }
        self.set_length(self.buf.len() - HEADER_LEN);
    }

    fn set_length(&mut self, len: usize) {
        self.buf[2..4].copy_from_slice(&(len as u16).to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::stun::constants::{ATTR_USE_CANDIDATE, ATTR_XOR_MAPPED_ADDRESS};

    fn sample_request() -> Vec<u8> {
        MessageBuilder::new(MessageType::BindingRequest, [7u8; 12])
            .attribute(&StunAttribute::Username("local:remote".into()))
            .attribute(&StunAttribute::Priority(0x6e00_01ff))
            .attribute(&StunAttribute::IceControlling(0x1122_3344_5566_7788))
            .attribute(&StunAttribute::UseCandidate)
            .message_integrity(b"remote-password")
            .unwrap()
            .fingerprint()
            .build()
    }

    #[test]
    fn builder_output_decodes_with_integrity_and_fingerprint() {
        let bytes = sample_request();
        assert!(looks_like_stun(&bytes));
        let msg = StunMessage::decode(&bytes).unwrap();
        assert_eq!(msg.msg_type, MessageType::BindingRequest);
        assert_eq!(msg.transaction_id, [7u8; 12]);
        assert_eq!(msg.username(), Some("local:remote"));
        assert!(msg.has_attribute(ATTR_USE_CANDIDATE));
        assert!(msg.verify_integrity(b"remote-password"));
        assert!(!msg.verify_integrity(b"wrong-password"));
    }

    #[test]
    fn flipped_bit_breaks_fingerprint() {
        let mut bytes = sample_request();
        bytes[HEADER_LEN + 5] ^= 0x01;
        assert_eq!(
            StunMessage::decode(&bytes).unwrap_err(),
            StunError::FingerprintMismatch
        );
    }

    #[test]
    fn integrity_without_fingerprint_still_verifies() {
        let bytes = MessageBuilder::new(MessageType::BindingSuccess, [1u8; 12])
            .attribute(&StunAttribute::XorMappedAddress("10.0.0.1:5000".parse().unwrap()))
            .message_integrity(b"pw")
            .unwrap()
            .build();
        let msg = StunMessage::decode(&bytes).unwrap();
        assert!(msg.has_attribute(ATTR_XOR_MAPPED_ADDRESS));
        assert!(msg.verify_integrity(b"pw"));
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let mut bytes = sample_request();
        bytes.push(0);
        assert!(matches!(
            StunMessage::decode(&bytes),
            Err(StunError::BadLength { .. })
        ));
    }

    #[test]
    fn overrunning_attribute_is_rejected() {
        let mut bytes = MessageBuilder::new(MessageType::BindingRequest, [0u8; 12])
            .attribute(&StunAttribute::Username("abcd".into()))
            .build();
        // claim a 64-byte username
        bytes[HEADER_LEN + 3] = 64;
        assert_eq!(
            StunMessage::decode(&bytes).unwrap_err(),
            StunError::AttributeOverrun { attr_type: 0x0006 }
        );
    }

    #[test]
    fn short_or_foreign_datagrams_are_not_stun() {
        assert_eq!(StunMessage::decode(&[0u8; 10]).unwrap_err(), StunError::TooShort(10));
        let mut rtp = vec![0x80u8; 24];
        rtp[1] = 96;
        assert_eq!(StunMessage::decode(&rtp).unwrap_err(), StunError::NotStun);
    }

    #[test]
    fn usernames_are_padded_to_four_bytes() {
        let bytes = MessageBuilder::new(MessageType::BindingRequest, [0u8; 12])
            .attribute(&StunAttribute::Username("abcde".into()))
            .build();
        assert_eq!(bytes.len(), HEADER_LEN + 4 + 8);
        assert_eq!(StunMessage::decode(&bytes).unwrap().username(), Some("abcde"));
    }
}

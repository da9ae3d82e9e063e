use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::{BufMut, BytesMut};

use crate::stun::{
    constants::{
        ATTR_ERROR_CODE, ATTR_FINGERPRINT, ATTR_ICE_CONTROLLED, ATTR_ICE_CONTROLLING,
        ATTR_MESSAGE_INTEGRITY, ATTR_PRIORITY, ATTR_SOFTWARE, ATTR_USE_CANDIDATE, ATTR_USERNAME,
        ATTR_XOR_MAPPED_ADDRESS, FAMILY_IPV4, FAMILY_IPV6, HMAC_SHA1_LEN, MAGIC_COOKIE,
        TRANSACTION_ID_LEN,
    },
    stun_error::StunError,
};

/// Attributes understood by the ICE engine. Anything else is kept as `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StunAttribute {
    Username(String),
    MessageIntegrity([u8; HMAC_SHA1_LEN]),
    ErrorCode { code: u16, reason: String },
    XorMappedAddress(SocketAddr),
    Priority(u32),
    UseCandidate,
    IceControlled(u64),
    IceControlling(u64),
    Software(String),
    Fingerprint(u32),
    Unknown { attr_type: u16, value: Vec<u8> },
}

impl StunAttribute {
    #[must_use]
    pub fn attr_type(&self) -> u16 {
        match self {
            StunAttribute::Username(_) => ATTR_USERNAME,
            StunAttribute::MessageIntegrity(_) => ATTR_MESSAGE_INTEGRITY,
            StunAttribute::ErrorCode { .. } => ATTR_ERROR_CODE,
            StunAttribute::XorMappedAddress(_) => ATTR_XOR_MAPPED_ADDRESS,
            StunAttribute::Priority(_) => ATTR_PRIORITY,
            StunAttribute::UseCandidate => ATTR_USE_CANDIDATE,
            StunAttribute::IceControlled(_) => ATTR_ICE_CONTROLLED,
            StunAttribute::IceControlling(_) => ATTR_ICE_CONTROLLING,
            StunAttribute::Software(_) => ATTR_SOFTWARE,
            StunAttribute::Fingerprint(_) => ATTR_FINGERPRINT,
            StunAttribute::Unknown { attr_type, .. } => *attr_type,
        }
    }

    /// Serializes the attribute value (without type/length header or padding).
    pub fn encode_value(&self, transaction_id: &[u8; TRANSACTION_ID_LEN], out: &mut BytesMut) {
        match self {
            StunAttribute::Username(s) | StunAttribute::Software(s) => out.put_slice(s.as_bytes()),
            StunAttribute::MessageIntegrity(mac) => out.put_slice(mac),
            StunAttribute::ErrorCode { code, reason } => {
                out.put_u16(0);
                out.put_u8(((code / 100) & 0x07) as u8);
                out.put_u8((code % 100) as u8);
                out.put_slice(reason.as_bytes());
            }
            StunAttribute::XorMappedAddress(addr) => encode_xor_address(addr, transaction_id, out),
            StunAttribute::Priority(p) => out.put_u32(*p),
            StunAttribute::UseCandidate => {}
            StunAttribute::IceControlled(t) | StunAttribute::IceControlling(t) => out.put_u64(*t),
            StunAttribute::Fingerprint(crc) => out.put_u32(*crc),
            StunAttribute::Unknown { value, .. } => out.put_slice(value),
        }
    }

    pub fn decode(
        attr_type: u16,
        value: &[u8],
        transaction_id: &[u8; TRANSACTION_ID_LEN],
    ) -> Result<Self, StunError> {
        let malformed = || StunError::MalformedAttribute { attr_type };
        let attr = match attr_type {
            ATTR_USERNAME => StunAttribute::Username(
                String::from_utf8(value.to_vec()).map_err(|_| malformed())?,
            ),
            ATTR_SOFTWARE => StunAttribute::Software(String::from_utf8_lossy(value).into_owned()),
            ATTR_MESSAGE_INTEGRITY => {
                StunAttribute::MessageIntegrity(value.try_into().map_err(|_| malformed())?)
            }
            ATTR_ERROR_CODE => {
                if value.len() < 4 {
                    return Err(malformed());
                }
                let code = u16::from(value[2] & 0x07) * 100 + u16::from(value[3]);
                StunAttribute::ErrorCode {
                    code,
                    reason: String::from_utf8_lossy(&value[4..]).into_owned(),
                }
            }
            ATTR_XOR_MAPPED_ADDRESS => {
                StunAttribute::XorMappedAddress(decode_xor_address(value, transaction_id).ok_or_else(malformed)?)
            }
            ATTR_PRIORITY => StunAttribute::Priority(u32::from_be_bytes(
                value.try_into().map_err(|_| malformed())?,
            )),
            ATTR_USE_CANDIDATE => StunAttribute::UseCandidate,
            ATTR_ICE_CONTROLLED => StunAttribute::IceControlled(u64::from_be_bytes(
                value.try_into().map_err(|_| malformed())?,
            )),
            ATTR_ICE_CONTROLLING => StunAttribute::IceControlling(u64::from_be_bytes(
                value.try_into().map_err(|_| malformed())?,
            )),
            ATTR_FINGERPRINT => StunAttribute::Fingerprint(u32::from_be_bytes(
                value.try_into().map_err(|_| malformed())?,
            )),
            other => StunAttribute::Unknown {
                attr_type: other,
                value: value.to_vec(),
            },
        };
        Ok(attr)
    }
}

fn xor_key(transaction_id: &[u8; TRANSACTION_ID_LEN]) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    key[4..].copy_from_slice(transaction_id);
    key
}

fn encode_xor_address(addr: &SocketAddr, transaction_id: &[u8; TRANSACTION_ID_LEN], out: &mut BytesMut) {
    let key = xor_key(transaction_id);
    let port = addr.port() ^ (MAGIC_COOKIE >> 16) as u16;
    out.put_u8(0);
    match addr.ip() {
        IpAddr::V4(ip) => {
            out.put_u8(FAMILY_IPV4);
            out.put_u16(port);
            for (b, k) in ip.octets().iter().zip(&key[..4]) {
                out.put_u8(b ^ k);
            }
        }
        IpAddr::V6(ip) => {
            out.put_u8(FAMILY_IPV6);
            out.put_u16(port);
            for (b, k) in ip.octets().iter().zip(&key) {
                out.put_u8(b ^ k);
            }
        }
    }
}

fn decode_xor_address(value: &[u8], transaction_id: &[u8; TRANSACTION_ID_LEN]) -> Option<SocketAddr> {
    if value.len() < 4 {
        return None;
    }
    let key = xor_key(transaction_id);
    let port = u16::from_be_bytes([value[2], value[3]]) ^ (MAGIC_COOKIE >> 16) as u16;
    match value[1] {
        FAMILY_IPV4 if value.len() == 8 => {
            let mut octets = [0u8; 4];
            for (i, o) in octets.iter_mut().enumerate() {
                *o = value[4 + i] ^ key[i];
            }
            Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(octets)), port))
        }
        FAMILY_IPV6 if value.len() == 20 => {
            let mut octets = [0u8; 16];
            for (i, o) in octets.iter_mut().enumerate() {
                *o = value[4 + i] ^ key[i];
            }
            Some(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
        }
        _ => None,
    }
}

pub const MAGIC_COOKIE: u32 = 0x2112_A442;
pub const HEADER_LEN: usize = 20;
pub const TRANSACTION_ID_LEN: usize = 12;
pub const ATTR_HEADER_LEN: usize = 4;

pub const FINGERPRINT_XOR: u32 = 0x5354_554E;
pub const HMAC_SHA1_LEN: usize = 20;
/// MESSAGE-INTEGRITY attribute including its 4-byte header.
pub const INTEGRITY_ATTR_LEN: usize = ATTR_HEADER_LEN + HMAC_SHA1_LEN;
/// FINGERPRINT attribute including its 4-byte header.
pub const FINGERPRINT_ATTR_LEN: usize = ATTR_HEADER_LEN + 4;

// Message types (method Binding = 0x001)
pub const BINDING_REQUEST: u16 = 0x0001;
pub const BINDING_INDICATION: u16 = 0x0011;
pub const BINDING_SUCCESS_RESPONSE: u16 = 0x0101;
pub const BINDING_ERROR_RESPONSE: u16 = 0x0111;

// Attribute types (RFC 5389 / RFC 8445)
pub const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
pub const ATTR_USERNAME: u16 = 0x0006;
pub const ATTR_MESSAGE_INTEGRITY: u16 = 0x0008;
pub const ATTR_ERROR_CODE: u16 = 0x0009;
pub const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;
pub const ATTR_PRIORITY: u16 = 0x0024;
pub const ATTR_USE_CANDIDATE: u16 = 0x0025;
pub const ATTR_SOFTWARE: u16 = 0x8022;
pub const ATTR_FINGERPRINT: u16 = 0x8028;
pub const ATTR_ICE_CONTROLLED: u16 = 0x8029;
pub const ATTR_ICE_CONTROLLING: u16 = 0x802A;

pub const FAMILY_IPV4: u8 = 0x01;
pub const FAMILY_IPV6: u8 = 0x02;

pub const ERROR_BAD_REQUEST: u16 = 400;
pub const ERROR_UNAUTHORIZED: u16 = 401;
pub const ERROR_ROLE_CONFLICT: u16 = 487;

/// Rounds an attribute length up to a 4-byte boundary.
#[must_use]
pub fn pad_size(size: usize) -> usize {
    let range = size % 4;
    if range == 0 { 0 } else { 4 - range }
}

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StunError {
    #[error("message too short: {0} bytes")]
    TooShort(usize),
    #[error("not a STUN message")]
    NotStun,
    #[error("header length {declared} does not match {actual} body bytes")]
    BadLength { declared: usize, actual: usize },
    #[error("attribute {attr_type:#06x} overruns message")]
    AttributeOverrun { attr_type: u16 },
    #[error("malformed attribute {attr_type:#06x}")]
    MalformedAttribute { attr_type: u16 },
    #[error("fingerprint mismatch")]
    FingerprintMismatch,
    #[error("message-integrity key rejected")]
    InvalidKey,
}

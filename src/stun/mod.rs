//! STUN binding messages (RFC 5389) with the ICE attributes of RFC 8445.

pub mod attribute;
pub mod constants;
pub mod stun_error;
pub mod stun_message;

pub use attribute::StunAttribute;
pub use stun_error::StunError;
pub use stun_message::{MessageBuilder, MessageType, StunMessage, looks_like_stun};

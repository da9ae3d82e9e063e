//! Per-call media channels: socket, ICE, DTLS and SRTP wired together.

pub mod channel_error;
pub mod channel_params;
pub mod channel_registry;
pub mod media_channel;
pub mod media_event;

pub use channel_error::ChannelError;
pub use channel_params::{ChannelParams, ChannelSettings};
pub use channel_registry::ChannelRegistry;
pub use media_channel::{ChannelRuntime, MediaChannel};
pub use media_event::{CloseReason, InboundMedia, MediaEvent};

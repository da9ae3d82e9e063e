//! Shared pool of readiness loops driving every channel socket.

pub mod channel_multiplexer;
pub mod multiplexer_error;
pub mod poll_owner;

pub use channel_multiplexer::{ChannelMultiplexer, Registration};
pub use multiplexer_error::MultiplexerError;
pub use poll_owner::PollOwner;

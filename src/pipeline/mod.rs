//! Single-socket demultiplexing of STUN, DTLS, SRTP and SRTCP.

pub mod classifier;
pub mod handler_pipeline;
pub mod media_receiver;
pub mod packet_handler;

pub use classifier::{PacketKind, classify};
pub use handler_pipeline::PacketHandlerPipeline;
pub use media_receiver::{MediaKind, MediaReceiver, MediaSink, ReceiveCounters, ReceiveStats};
pub use packet_handler::PacketHandler;

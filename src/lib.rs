//! rustygate is the secure media transport core of a WebRTC to RTSP gateway.
//!
//! Each call owns one UDP socket carrying STUN, DTLS, SRTP and SRTCP. The
//! crate drives the ICE connectivity check, runs the DTLS-SRTP handshake,
//! derives the SRTP keys and hands decrypted RTP/RTCP to the relay side.
//! A shared pool of readiness loops services every call socket.
//!
//! It provides one binary, `rustygate`, which hosts a [`gateway::MediaGateway`].

/// Per-call media channels and their registry.
pub mod channel;
/// Handles configuration loading and management.
pub mod config;
/// DTLS-SRTP handshake over a datagram adapter.
pub mod dtls;
/// Process-wide facade owning the shared runtime.
pub mod gateway;
/// ICE connectivity checks (STUN binding, candidate selection).
pub mod ice;
/// Logging utilities for the application.
pub mod log;
/// Readiness multiplexers shared by all channel sockets.
pub mod multiplexer;
/// Demultiplexing of the datagrams arriving on a channel socket.
pub mod pipeline;
/// RTCP header and report block reading, congestion signal.
pub mod rtcp;
/// Fixed-rate timers.
pub mod scheduler;
/// SRTP (Secure Real-time Transport Protocol) implementation.
pub mod srtp;
/// STUN message codec.
pub mod stun;
/// Write-side abstraction of a channel socket.
pub mod transport;

//! SRTP/SRTCP protection (RFC 3711) keyed from a DTLS-SRTP export.

pub mod constants;
mod replay_window;
pub mod session_keys;
pub mod srtcp_crypto_context;
pub mod srtp_crypto_context;
pub mod srtp_endpoint_keys;
pub mod srtp_error;
pub mod srtp_policy;
pub mod srtp_session_config;
pub mod transformer;
mod utils;

pub use srtcp_crypto_context::SrtcpCryptoContext;
pub use srtp_crypto_context::SrtpCryptoContext;
pub use srtp_endpoint_keys::SrtpEndpointKeys;
pub use srtp_error::SrtpError;
pub use srtp_policy::{AuthAlgorithm, EncryptionAlgorithm, SrtpPolicy, SrtpProfile};
pub use srtp_session_config::SrtpSessionConfig;
pub use transformer::{Direction, PacketTransformer, SrtcpTransformer, SrtpTransformer, SrtpTransformers};

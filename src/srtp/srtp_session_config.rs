use crate::srtp::{SrtpEndpointKeys, SrtpProfile};

/// Result of a DTLS-SRTP key export, already mapped to this endpoint's role.
#[derive(Debug, Clone)]
pub struct SrtpSessionConfig {
    pub profile: SrtpProfile,
    pub outbound: SrtpEndpointKeys,
    pub inbound: SrtpEndpointKeys,
}

use std::{net::SocketAddr, time::Duration};

use crate::{config::GatewayConfig, dtls::DtlsSettings, ice::IceCredentials};

/// What the signaling layer negotiated for one call.
#[derive(Debug, Clone)]
pub struct ChannelParams {
    pub call_id: String,
    pub local_credentials: IceCredentials,
    pub remote_credentials: IceCredentials,
    pub remote_candidates: Vec<SocketAddr>,
    /// Payload types from the remote media description. Empty accepts all.
    pub remote_payload_types: Vec<u8>,
    /// ICE-controlling side; it also plays the DTLS client.
    pub controlling: bool,
    /// `a=fingerprint:sha-256` of the remote certificate.
    pub remote_fingerprint: Option<String>,
}

/// Process-wide knobs copied into each channel.
#[derive(Debug, Clone, Copy)]
pub struct ChannelSettings {
    pub bind_address: SocketAddr,
    pub stun_interval: Duration,
    pub dtls: DtlsSettings,
    pub congestion_loss_threshold: f32,
}

impl From<&GatewayConfig> for ChannelSettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            bind_address: config.bind_address,
            stun_interval: config.stun_interval,
            dtls: DtlsSettings::from(config),
            congestion_loss_threshold: config.congestion_loss_threshold,
        }
    }
}

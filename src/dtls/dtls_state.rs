use crate::dtls::dtls_role::DtlsRole;

/// Lifecycle of one handshake engine. `Failed` keeps the reason for logs/events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DtlsHandshakeState {
    Idle,
    Handshaking(DtlsRole),
    Complete,
    Failed(String),
}

impl DtlsHandshakeState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, DtlsHandshakeState::Complete | DtlsHandshakeState::Failed(_))
    }
}

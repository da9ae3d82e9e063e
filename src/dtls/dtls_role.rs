/// Represents the DTLS role in a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtlsRole {
    /// The DTLS client role, played by the ICE-controlling side.
    Client,
    /// The DTLS server role.
    Server,
}

impl DtlsRole {
    /// Maps the ICE `USE-CANDIDATE` decision onto a DTLS role.
    #[must_use]
    pub fn from_use_candidate(use_candidate: bool) -> Self {
        if use_candidate {
            DtlsRole::Client
        } else {
            DtlsRole::Server
        }
    }
}

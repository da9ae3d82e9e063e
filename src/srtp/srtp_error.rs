use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SrtpError {
    #[error("packet too short: {0} bytes")]
    TooShort(usize),
    #[error("malformed RTP header: {0}")]
    BadHeader(&'static str),
    #[error("replayed packet (index {0})")]
    Replay(i64),
    #[error("packet outside replay window (index {0})")]
    TooOld(i64),
    #[error("authentication tag mismatch")]
    AuthFailed,
    #[error("session keys already derived")]
    AlreadyDerived,
    #[error("session keys not derived")]
    NotDerived,
    #[error("invalid key material: {0}")]
    InvalidKey(&'static str),
    #[error("SSRC limit reached ({0} contexts)")]
    TooManySsrcs(usize),
    #[error("unsupported SRTP profile: {0}")]
    UnsupportedProfile(String),
}

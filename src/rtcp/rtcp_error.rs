use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RtcpError {
    #[error("buffer too short")]
    TooShort,
    #[error("bad RTCP version: {0}")]
    BadVersion(u8),
    #[error("truncated RTCP structure")]
    Truncated,
    #[error("not an RTCP packet type: {0}")]
    NotRtcp(u8),
}

use std::{io, time::Duration};

use openssl::error::ErrorStack;
use thiserror::Error;

use crate::srtp::SrtpError;

#[derive(Debug, Error)]
pub enum DtlsError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("OpenSSL error: {0}")]
    Ssl(String),
    #[error("Handshake error: {0}")]
    Handshake(String),
    #[error("handshake taking too long (over {0:?})")]
    Timeout(Duration),
    #[error("handshake aborted")]
    Aborted,
    #[error("No SRTP profile negotiated")]
    NoSrtpProfile,
    #[error("Key export failed: {0}")]
    KeyExport(String),
    #[error("SRTP setup failed: {0}")]
    Srtp(#[from] SrtpError),
}

impl From<ErrorStack> for DtlsError {
    fn from(e: ErrorStack) -> Self {
        DtlsError::Ssl(format!("{}", e))
    }
}

use std::{io, net::SocketAddr};

use thiserror::Error;

use crate::{dtls::DtlsError, multiplexer::MultiplexerError, srtp::SrtpError};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Multiplexer(#[from] MultiplexerError),
    #[error(transparent)]
    Dtls(#[from] DtlsError),
    #[error(transparent)]
    Srtp(#[from] SrtpError),
    #[error("channel has no SRTP keys yet")]
    NotReady,
    #[error("channel is closed")]
    Closed,
    #[error("call id already in use: {0}")]
    DuplicateCallId(String),
}

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MultiplexerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("multiplexer pool is not running")]
    NotRunning,
    #[error("unknown registration {0:?}")]
    UnknownRegistration(super::Registration),
}

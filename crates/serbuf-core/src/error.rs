use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported baud rate {0}")]
    UnsupportedBaudRate(u32),

    #[error("unknown parity mode `{0}`")]
    UnsupportedParity(String),

    #[error("could not open {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("could not configure {path}: {source}")]
    ConfigurationFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("could not close {path}: {source}")]
    CloseFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("serial channel has not been initialized")]
    NotOpen,

    #[error("serial channel is already open")]
    AlreadyOpen,

    #[error("line i/o failed: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

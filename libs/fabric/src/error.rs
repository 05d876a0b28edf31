use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Channel not open: {0}")]
    NotOpen(String),

    #[error("{operation} timeout exceeded after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Worker pool has been shut down")]
    PoolShutdown,

    #[error(transparent)]
    Core(#[from] courier_core::Error),

    #[error("{0}")]
    Custom(String),
}

impl Error {
    pub fn timeout(operation: &'static str, after: Duration) -> Self {
        Self::Timeout { operation, after }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

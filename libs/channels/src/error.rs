use std::time::Duration;

use courier_core::Uri;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelsError {
    /// A channel could not be brought to life, or was refused
    #[error("failed to open channel {uri}: {cause}")]
    Lifetime {
        uri: Uri,
        #[source]
        cause: LifetimeCause,
    },

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("configuration could not be loaded: {0}")]
    Configuration(#[source] courier_core::Error),

    #[error("worker pool could not be created: {0}")]
    Pool(#[source] courier_fabric::Error),

    #[error("channels have been shut down")]
    Shutdown,
}

#[derive(Error, Debug)]
pub enum LifetimeCause {
    #[error("no provider found for scheme '{0}'")]
    NoProvider(String),

    #[error("open did not complete within {0:?}")]
    OpenTimeout(Duration),

    #[error("open was interrupted")]
    Interrupted,

    #[error("already open with message type {existing}")]
    TypeMismatch { existing: &'static str },

    #[error(transparent)]
    Fabric(#[from] courier_fabric::Error),
}

impl ChannelsError {
    pub fn lifetime(uri: &Uri, cause: impl Into<LifetimeCause>) -> Self {
        Self::Lifetime {
            uri: uri.clone(),
            cause: cause.into(),
        }
    }

    pub fn is_lifetime(&self) -> bool {
        matches!(self, Self::Lifetime { .. })
    }
}

pub type Result<T> = std::result::Result<T, ChannelsError>;

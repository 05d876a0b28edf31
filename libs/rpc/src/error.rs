use std::time::Duration;

use courier_channels::ChannelsError;
use thiserror::Error;

/// Failure of a remote command call, one variant per way it can go wrong
#[derive(Error, Debug)]
pub enum RpcError {
    /// The RPC channel could not be opened
    #[error(transparent)]
    Channel(#[from] ChannelsError),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The call was abandoned before a response arrived
    #[error("call interrupted before a response arrived")]
    Interrupted,

    #[error("call failed: {0}")]
    Execution(#[source] courier_fabric::Error),

    /// The server answered with an error
    #[error("command failed: {0}")]
    FailedResponse(String),
}

pub type Result<T> = std::result::Result<T, RpcError>;

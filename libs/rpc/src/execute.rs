use std::time::Duration;

use courier_channels::Channels;
use courier_core::Uri;
use serde_json::Value;
use tracing::debug;

use crate::client::RpcClient;
use crate::command::CommandRequest;
use crate::error::Result;

/// Run `cmd` on the command server at `server` and return its output
///
/// Blocks for at most `timeout_secs` seconds once the request is sent,
/// plus the channel open timeout if the RPC channel is not open yet.
///
/// # Errors
///
/// - [`RpcError::Channel`](crate::RpcError::Channel) if the channel cannot be opened
/// - [`RpcError::Timeout`](crate::RpcError::Timeout) if no response arrives in time
/// - [`RpcError::Interrupted`](crate::RpcError::Interrupted) if the call is abandoned,
///   e.g. the channel closes while waiting
/// - [`RpcError::Execution`](crate::RpcError::Execution) if the request cannot be sent
/// - [`RpcError::FailedResponse`](crate::RpcError::FailedResponse) if the server
///   reports an error
pub fn execute(
    channels: &Channels,
    server: &Uri,
    cmd: &str,
    timeout_secs: u64,
    params: Vec<Value>,
) -> Result<Value> {
    let client = RpcClient::new(channels.clone(), server.clone());
    let request = CommandRequest::from(cmd, params);
    debug!(server = %server, command = cmd, id = request.id, "executing");

    let response = client
        .call(request)?
        .wait(Duration::from_secs(timeout_secs))?;
    response.into_result()
}

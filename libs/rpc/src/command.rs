use std::sync::atomic::{AtomicU64, Ordering};

use courier_fabric::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, RpcError};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A named command with its positional parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl CommandRequest {
    /// Build a request with a fresh id, unique within this process
    pub fn from(name: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            params,
        }
    }
}

/// Answer to exactly one [`CommandRequest`], carrying its id
///
/// When `err` is set, `out` holds the error message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub id: u64,
    pub err: bool,
    pub out: Value,
}

impl CommandResponse {
    pub fn ok(id: u64, out: Value) -> Self {
        Self { id, err: false, out }
    }

    pub fn failure(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            err: true,
            out: Value::String(message.into()),
        }
    }

    /// The output, or [`RpcError::FailedResponse`] if the server reported an error
    pub fn into_result(self) -> Result<Value> {
        if !self.err {
            return Ok(self.out);
        }
        let message = match self.out {
            Value::String(message) => message,
            other => other.to_string(),
        };
        Err(RpcError::FailedResponse(message))
    }
}

/// Envelope carried on an RPC channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RpcMessage {
    Request(CommandRequest),
    Response(CommandResponse),
}

impl Message for RpcMessage {}

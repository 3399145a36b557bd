//! JSON-RPC 2.0 request/response envelopes.
//!
//! The gateway's only wire contract: decode a [`RequestEnvelope`], produce a
//! [`ResponseEnvelope`] that echoes the same `id` and carries exactly one of
//! `result`/`error`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;

/// Inbound JSON-RPC request.
///
/// `id` is round-tripped verbatim: it may be a number, a string, or `null`
/// per the JSON-RPC 2.0 spec, so it is kept as a raw [`Value`] rather than
/// parsed into a concrete type.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestEnvelope {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RequestEnvelope {
    /// Params as an array, defaulting to empty when the client omitted them
    /// or sent `null`.
    pub fn params_array(&self) -> Vec<Value> {
        match &self.params {
            Value::Array(items) => items.clone(),
            Value::Null => Vec::new(),
            other => vec![other.clone()],
        }
    }
}

/// Outbound JSON-RPC response: exactly one of `result` or `error`.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEnvelope {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseEnvelope {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Value, error: &GatewayError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcErrorBody {
                code: error.code(),
                message: error.to_string(),
                data: error.data(),
            }),
        }
    }
}

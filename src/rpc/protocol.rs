//! Wire contract for the fixing service
//!
//! Requests are `{protocol_version, id, method, params}`; responses are
//! `{id, result | error{code, message}}`. Tool invocations go through the
//! fixed method `tools/call` with `params = {name, arguments}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Protocol revision sent with every request.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Method used for the connection handshake.
pub const METHOD_INITIALIZE: &str = "initialize";

/// Method carrying all tool invocations.
pub const METHOD_TOOLS_CALL: &str = "tools/call";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub protocol_version: String,
    /// Correlates this request with its response.
    pub id: Uuid,
    pub method: String,
    pub params: Value,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            id: Uuid::new_v4(),
            method: method.into(),
            params,
        }
    }

    /// Build a `tools/call` request for a named tool.
    pub fn tool_call(name: &str, arguments: Value) -> Self {
        Self::new(
            METHOD_TOOLS_CALL,
            serde_json::json!({ "name": name, "arguments": arguments }),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorPayload {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: Uuid,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorPayload>,
}

impl RpcResponse {
    /// A successful response answering `request`.
    pub fn ok(request: &RpcRequest, result: Value) -> Self {
        Self {
            id: request.id,
            result: Some(result),
            error: None,
        }
    }

    /// An error response answering `request`.
    pub fn err(request: &RpcRequest, code: i64, message: impl Into<String>) -> Self {
        Self {
            id: request.id,
            result: None,
            error: Some(RpcErrorPayload {
                code,
                message: message.into(),
            }),
        }
    }
}

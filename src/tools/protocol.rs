//! Tool Server Wire Protocol
//!
//! The tool process speaks line-delimited JSON-RPC 2.0: one structured
//! message per newline-terminated line in each direction. Requests carry a
//! numeric id; responses are correlated back by that id and carry a
//! `result` payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC protocol version sent on every request.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method name for tool discovery.
pub const METHOD_LIST_TOOLS: &str = "tools/list";

/// Method name for tool invocation.
pub const METHOD_CALL_TOOL: &str = "tools/call";

/// A single framed request line.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// A tool exposed by the server process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// Result payload of a `tools/list` call.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolListing {
    pub tools: Vec<ToolDescriptor>,
}

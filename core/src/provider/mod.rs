//! Tool provider connections
//!
//! A tool provider is an independently running process or endpoint that
//! exposes named callables with JSON-schema parameters. Both transports
//! (stdio-framed JSON-RPC and HTTP) hide behind [`ProviderConnection`];
//! the gateway never sees the wire.

mod http;
mod stdio;

pub use http::HttpProvider;
pub use stdio::StdioProvider;

use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Transport backing a provider connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Child process speaking line-delimited JSON-RPC over stdio
    Process,

    /// HTTP endpoint speaking JSON-RPC
    Network,
}

/// A tool as declared by its provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// JSON schema for the tool's parameters
    #[serde(rename = "inputSchema", default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// Uniform contract over a live provider, regardless of transport
#[async_trait]
pub trait ProviderConnection: Send + Sync {
    /// Configured provider id
    fn id(&self) -> &str;

    fn transport(&self) -> TransportKind;

    /// Fetch the provider's declared tools
    async fn list_tools(&self) -> Result<Vec<ToolSpec>>;

    /// Invoke one tool; returns the provider's raw result payload
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value>;

    /// Tear the connection down. Idempotent.
    async fn shutdown(&self);
}

/// Extract the `result` member of a JSON-RPC response, surfacing the
/// `error` member if present.
pub(crate) fn extract_result(response: Value) -> Result<Value> {
    if let Some(error) = response.get("error") {
        return Err(GatewayError::Protocol {
            message: error.to_string(),
        }
        .into());
    }

    match response.get("result") {
        Some(result) => Ok(result.clone()),
        None => Err(GatewayError::Protocol {
            message: "response carries neither result nor error".to_string(),
        }
        .into()),
    }
}

/// Parse a `tools/list` result into tool specs.
///
/// Accepts both the list form (`{"tools": [...]}`) and the map form
/// (`{"tools": {name: spec}}`) some servers emit.
pub(crate) fn tools_from_result(result: Value) -> Result<Vec<ToolSpec>> {
    let Some(tools) = result.get("tools") else {
        return Ok(Vec::new());
    };

    match tools {
        Value::Array(entries) => entries
            .iter()
            .map(|entry| {
                serde_json::from_value(entry.clone()).map_err(|e| {
                    GatewayError::Protocol {
                        message: format!("malformed tool entry: {}", e),
                    }
                    .into()
                })
            })
            .collect(),
        Value::Object(entries) => Ok(entries
            .iter()
            .map(|(name, spec)| ToolSpec {
                name: name.clone(),
                description: spec
                    .get("description")
                    .and_then(|d| d.as_str())
                    .unwrap_or_default()
                    .to_string(),
                input_schema: spec
                    .get("inputSchema")
                    .or_else(|| spec.get("parameters"))
                    .cloned()
                    .unwrap_or_else(empty_schema),
            })
            .collect()),
        _ => Err(GatewayError::Protocol {
            message: "tools member is neither array nor object".to_string(),
        }
        .into()),
    }
}

/// Normalize a tool-call result into a string for message-history
/// embedding: the first textual content part wins, otherwise the whole
/// payload is serialized.
pub fn result_text(result: &Value) -> String {
    if let Some(parts) = result.get("content").and_then(|c| c.as_array()) {
        for part in parts {
            if part.get("type").and_then(|t| t.as_str()) == Some("text") {
                if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                    return text.to_string();
                }
            }
        }
    }

    if let Some(text) = result.as_str() {
        return text.to_string();
    }

    serde_json::to_string(result).unwrap_or_default()
}

//! Network-backed provider speaking JSON-RPC over HTTP POST

use super::{extract_result, tools_from_result, ProviderConnection, ToolSpec, TransportKind};
use crate::config::NetworkProviderConfig;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A provider reached over HTTP. Dropping the connection is the whole
/// teardown; there is no process to supervise.
pub struct HttpProvider {
    id: String,
    url: String,
    client: Client,
    request_id: AtomicU64,
}

impl HttpProvider {
    /// Build the client and probe the endpoint with an initialize request
    pub async fn connect(
        id: impl Into<String>,
        config: &NetworkProviderConfig,
        request_timeout: Duration,
    ) -> Result<Self> {
        let id = id.into();

        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| GatewayError::ProviderConnection {
                provider: id.clone(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        let provider = Self {
            id: id.clone(),
            url: config.url.clone(),
            client,
            request_id: AtomicU64::new(0),
        };

        let params = json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "clientInfo": {
                "name": "toolgate",
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        provider
            .request("initialize", Some(params))
            .await
            .map_err(|e| GatewayError::ProviderConnection {
                provider: id,
                message: format!("initialize failed: {}", e),
            })?;

        Ok(provider)
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
        });
        if let Some(params) = params {
            request["params"] = params;
        }

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::ProviderConnection {
                provider: self.id.clone(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Protocol {
                message: format!("HTTP {}: {}", status, body),
            }
            .into());
        }

        let body: Value = response.json().await.map_err(|e| GatewayError::Protocol {
            message: format!("failed to parse response: {}", e),
        })?;

        Ok(body)
    }
}

#[async_trait]
impl ProviderConnection for HttpProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn transport(&self) -> TransportKind {
        TransportKind::Network
    }

    async fn list_tools(&self) -> Result<Vec<ToolSpec>> {
        let response = self.request("tools/list", None).await?;
        tools_from_result(extract_result(response)?)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        let params = json!({"name": name, "arguments": arguments});
        let response = self.request("tools/call", Some(params)).await?;
        let result = extract_result(response)?;

        if result.get("isError").and_then(|v| v.as_bool()) == Some(true) {
            return Err(GatewayError::ExecutionFailed {
                name: name.to_string(),
                message: super::result_text(&result),
            }
            .into());
        }

        Ok(result)
    }

    async fn shutdown(&self) {
        // Nothing to supervise; the connection just drops its client
        tracing::debug!(provider = %self.id, "network provider released");
    }
}

//! Process-backed provider speaking line-delimited JSON-RPC over stdio

use super::{extract_result, tools_from_result, ProviderConnection, ToolSpec, TransportKind};
use crate::config::ProcessProviderConfig;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};

/// Grace period between closing the child's stdin and the hard kill
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A provider launched as a supervised child process.
///
/// The process handle is owned exclusively by this connection; the
/// gateway tears it down through [`ProviderConnection::shutdown`].
pub struct StdioProvider {
    id: String,
    io: Mutex<StdioTransport>,
    request_id: AtomicU64,
    request_timeout: Duration,
}

struct StdioTransport {
    child: Child,
    /// Dropped on shutdown to signal the server to stop
    stdin: Option<ChildStdin>,
    lines: Lines<BufReader<ChildStdout>>,
}

impl StdioProvider {
    /// Spawn the configured process and run the initialize handshake
    pub async fn connect(
        id: impl Into<String>,
        config: &ProcessProviderConfig,
        request_timeout: Duration,
    ) -> Result<Self> {
        let id = id.into();

        let mut cmd = Command::new(&config.command);
        cmd.args(config.resolved_args());
        for (key, value) in &config.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| GatewayError::ProviderConnection {
            provider: id.clone(),
            message: format!("failed to spawn '{}': {}", config.command, e),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| GatewayError::ProviderConnection {
            provider: id.clone(),
            message: "child has no stdin".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| GatewayError::ProviderConnection {
            provider: id.clone(),
            message: "child has no stdout".to_string(),
        })?;

        // Forward the server's stderr into our logs so its buffer never fills
        if let Some(stderr) = child.stderr.take() {
            let provider = id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(provider = %provider, "stderr: {}", line);
                }
            });
        }

        let provider = Self {
            id,
            io: Mutex::new(StdioTransport {
                child,
                stdin: Some(stdin),
                lines: BufReader::new(stdout).lines(),
            }),
            request_id: AtomicU64::new(0),
            request_timeout,
        };

        provider.initialize().await?;
        Ok(provider)
    }

    async fn initialize(&self) -> Result<()> {
        let params = json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "clientInfo": {
                "name": "toolgate",
                "version": env!("CARGO_PKG_VERSION")
            }
        });

        self.request("initialize", Some(params))
            .await
            .map_err(|e| {
                GatewayError::ProviderConnection {
                    provider: self.id.clone(),
                    message: format!("initialize failed: {}", e),
                }
                .into()
            })
            .map(|_| ())
    }

    /// Send one JSON-RPC request and wait for its matching response
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

        let mut io = self.io.lock().await;

        let stdin = io.stdin.as_mut().ok_or_else(|| GatewayError::ProviderConnection {
            provider: self.id.clone(),
            message: "connection already shut down".to_string(),
        })?;
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;

        let response = timeout(
            self.request_timeout,
            Self::read_response(&mut io.lines, &self.id, id),
        )
        .await
        .map_err(|_| GatewayError::ToolTimeout {
            name: method.to_string(),
            seconds: self.request_timeout.as_secs(),
        })??;

        Ok(response)
    }

    /// Read lines until the response matching `id` arrives.
    ///
    /// Lines without an `id` are notifications and skipped. Responses
    /// with a lower id belong to requests that already timed out and are
    /// discarded, so one late answer does not skew every later call. An
    /// id above the in-flight request is a protocol error.
    async fn read_response(
        lines: &mut Lines<BufReader<ChildStdout>>,
        provider: &str,
        id: u64,
    ) -> Result<Value> {
        loop {
            let line = lines.next_line().await?.ok_or_else(|| {
                crate::error::Error::from(GatewayError::ProviderConnection {
                    provider: provider.to_string(),
                    message: "provider closed its stdout".to_string(),
                })
            })?;
            if line.trim().is_empty() {
                continue;
            }

            let message: Value = match serde_json::from_str(line.trim()) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(provider = %provider, "discarding malformed line: {}", e);
                    continue;
                }
            };

            match message.get("id").and_then(|v| v.as_u64()) {
                // Notification; keep reading
                None => continue,
                Some(got) if got == id => return Ok(message),
                Some(got) if got < id => {
                    tracing::debug!(provider = %provider, stale = got, "discarding stale response");
                    continue;
                }
                Some(got) => {
                    return Err(GatewayError::Protocol {
                        message: format!("response id {} does not match request id {}", got, id),
                    }
                    .into())
                }
            }
        }
    }
}

#[async_trait]
impl ProviderConnection for StdioProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn transport(&self) -> TransportKind {
        TransportKind::Process
    }

    async fn list_tools(&self) -> Result<Vec<ToolSpec>> {
        let response = self.request("tools/list", None).await?;
        tools_from_result(extract_result(response)?)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        let params = json!({"name": name, "arguments": arguments});
        let response = self.request("tools/call", Some(params)).await?;
        let result = extract_result(response)?;

        // MCP-style in-band tool failure
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
        let mut io = self.io.lock().await;

        // Closing stdin is the stop signal for a stdio server
        io.stdin.take();

        match timeout(SHUTDOWN_GRACE, io.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(provider = %self.id, "provider exited: {}", status);
            }
            Ok(Err(e)) => {
                tracing::warn!(provider = %self.id, "wait failed during shutdown: {}", e);
            }
            Err(_) => {
                tracing::warn!(provider = %self.id, "provider did not exit within grace period, killing");
                if let Err(e) = io.child.start_kill() {
                    tracing::warn!(provider = %self.id, "kill failed: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// A sh-based responder that answers requests in arrival order:
    /// initialize, tools/list, then tool calls.
    fn fixture_script() -> &'static str {
        r#"n=0
while read -r line; do
  n=$((n+1))
  case "$n" in
    1) printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"serverInfo":{"name":"fixture"}}}' ;;
    2) printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"echo","description":"Echo a message","inputSchema":{"type":"object"}}]}}' ;;
    *) printf '{"jsonrpc":"2.0","id":%d,"result":{"content":[{"type":"text","text":"hi"}]}}\n' "$n" ;;
  esac
done"#
    }

    fn fixture_config(dir: &std::path::Path) -> ProcessProviderConfig {
        let script = dir.join("server.sh");
        std::fs::write(&script, fixture_script()).unwrap();
        ProcessProviderConfig {
            command: "sh".to_string(),
            args: vec![script.to_string_lossy().to_string()],
            env: HashMap::new(),
            working_dir: None,
        }
    }

    #[tokio::test]
    async fn connect_list_call_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture_config(dir.path());

        let provider = StdioProvider::connect("fixture", &config, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(provider.transport(), TransportKind::Process);

        let tools = provider.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");

        let result = provider
            .call_tool("echo", serde_json::json!({"message": "hi"}))
            .await
            .unwrap();
        assert_eq!(super::super::result_text(&result), "hi");

        provider.shutdown().await;
        // A second shutdown must be harmless
        provider.shutdown().await;
    }

    #[tokio::test]
    async fn connect_fails_for_missing_command() {
        let config = ProcessProviderConfig {
            command: "definitely-not-a-real-binary-qq".to_string(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
        };

        let result = StdioProvider::connect("ghost", &config, Duration::from_secs(1)).await;
        assert!(matches!(
            result.err(),
            Some(crate::error::Error::Gateway(
                GatewayError::ProviderConnection { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn request_times_out_against_silent_server() {
        let dir = tempfile::tempdir().unwrap();
        // Reads forever, answers only the initialize request
        let script = dir.path().join("silent.sh");
        std::fs::write(
            &script,
            "read -r line\nprintf '%s\\n' '{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}'\nwhile read -r line; do :; done",
        )
        .unwrap();
        let config = ProcessProviderConfig {
            command: "sh".to_string(),
            args: vec![script.to_string_lossy().to_string()],
            env: HashMap::new(),
            working_dir: None,
        };

        let provider = StdioProvider::connect("silent", &config, Duration::from_millis(200))
            .await
            .unwrap();

        let started = std::time::Instant::now();
        let result = provider.list_tools().await;
        assert!(matches!(
            result.err(),
            Some(crate::error::Error::Gateway(GatewayError::ToolTimeout { .. }))
        ));
        assert!(started.elapsed() < Duration::from_secs(2));

        provider.shutdown().await;
    }

    #[tokio::test]
    async fn connection_recovers_after_a_timed_out_request() {
        let dir = tempfile::tempdir().unwrap();
        // Answers initialize immediately, stalls on the second request,
        // then answers promptly again
        let script = dir.path().join("laggy.sh");
        std::fs::write(
            &script,
            r#"n=0
while read -r line; do
  n=$((n+1))
  case "$n" in
    1) printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{}}' ;;
    2) sleep 1; printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"tools":[]}}' ;;
    *) printf '{"jsonrpc":"2.0","id":%d,"result":{"tools":[{"name":"echo","description":"","inputSchema":{"type":"object"}}]}}\n' "$n" ;;
  esac
done"#,
        )
        .unwrap();
        let config = ProcessProviderConfig {
            command: "sh".to_string(),
            args: vec![script.to_string_lossy().to_string()],
            env: HashMap::new(),
            working_dir: None,
        };

        let provider = StdioProvider::connect("laggy", &config, Duration::from_millis(300))
            .await
            .unwrap();

        // First listing stalls past the request timeout
        assert!(matches!(
            provider.list_tools().await.err(),
            Some(crate::error::Error::Gateway(GatewayError::ToolTimeout { .. }))
        ));

        // Let the late response land on the pipe, then retry: the stale
        // answer must be discarded and the fresh one returned
        tokio::time::sleep(Duration::from_millis(1200)).await;
        let tools = provider.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");

        provider.shutdown().await;
    }
}

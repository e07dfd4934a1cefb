//! Tool gateway
//!
//! Single source of truth for what tools exist and how to call them. The
//! gateway aggregates every provider connection into one flat, namespaced
//! catalog, owns the supervised lifecycle of provider processes, and
//! wraps each call with timeout, retry, and usage attribution.

pub mod provenance;

use crate::config::ProviderConfig;
use crate::error::{GatewayError, Result};
use crate::inference::ToolSchema;
use crate::provider::{HttpProvider, ProviderConnection, StdioProvider, ToolSpec};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{sleep, timeout, Duration};

/// Default timeout for a single tool invocation
pub const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Identity of the conversation on whose behalf a tool call runs.
///
/// Threaded explicitly through every invocation so that concurrent loop
/// runs can never observe each other's attribution; the gateway holds no
/// ambient "current context" slot.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub session_id: String,
    pub owner_id: String,
}

impl InvocationContext {
    pub fn new(session_id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            owner_id: owner_id.into(),
        }
    }
}

/// Retry policy for [`ToolGateway::invoke_with_retry`].
///
/// Retrying is only appropriate for idempotent tools; that judgment
/// belongs to the caller, not the gateway.
#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Total attempts
    pub max_retries: u32,

    /// Base backoff; the wait grows linearly (`retry_delay * attempt`)
    pub retry_delay: Duration,

    /// Per-attempt timeout
    pub timeout: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            timeout: DEFAULT_INVOKE_TIMEOUT,
        }
    }
}

/// Per-tool usage counters, attributed from the invocation context
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolUsage {
    pub call_count: u64,
    pub failure_count: u64,
    pub last_used: Option<DateTime<Utc>>,
    pub last_session: Option<String>,
}

/// A tool in the live dispatch table
#[derive(Clone)]
struct RegisteredTool {
    provider_id: String,
    spec: ToolSpec,
}

/// The gateway. Shared behind `Arc` by every in-flight conversation.
pub struct ToolGateway {
    providers: RwLock<HashMap<String, Arc<dyn ProviderConnection>>>,
    /// Flat dispatch table; on a name collision the later registration wins
    tools: RwLock<HashMap<String, RegisteredTool>>,
    /// Declared tool names per provider, kept independently of collisions
    provenance: RwLock<HashMap<String, Vec<String>>>,
    usage: RwLock<HashMap<String, ToolUsage>>,
    degraded: AtomicBool,
    connect_timeout: Duration,
}

impl ToolGateway {
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            tools: RwLock::new(HashMap::new()),
            provenance: RwLock::new(HashMap::new()),
            usage: RwLock::new(HashMap::new()),
            degraded: AtomicBool::new(false),
            connect_timeout: DEFAULT_INVOKE_TIMEOUT,
        }
    }

    /// Connect every configured provider and register its tools.
    ///
    /// Failures are isolated per provider: one unreachable provider is
    /// logged and skipped, never fatal. A gateway that ends up with zero
    /// usable tools is flagged degraded.
    pub async fn start(&self, configs: &HashMap<String, ProviderConfig>) -> Result<()> {
        // Deterministic registration order so name collisions resolve stably
        let mut ids: Vec<&String> = configs.keys().collect();
        ids.sort();

        for id in ids {
            let connection: Result<Arc<dyn ProviderConnection>> = match &configs[id] {
                ProviderConfig::Process(process) => {
                    StdioProvider::connect(id.clone(), process, self.connect_timeout)
                        .await
                        .map(|p| Arc::new(p) as Arc<dyn ProviderConnection>)
                }
                ProviderConfig::Network(network) => {
                    HttpProvider::connect(id.clone(), network, self.connect_timeout)
                        .await
                        .map(|p| Arc::new(p) as Arc<dyn ProviderConnection>)
                }
            };

            match connection {
                Ok(provider) => {
                    if let Err(e) = self.register_provider(provider).await {
                        tracing::warn!(provider = %id, "skipping provider, registration failed: {}", e);
                    }
                }
                Err(e) => {
                    tracing::warn!(provider = %id, "skipping provider, connection failed: {}", e);
                }
            }
        }

        // Validation pass
        let tool_count = self.tools.read().await.len();
        if tool_count == 0 {
            tracing::warn!("gateway started with zero usable tools; marking degraded");
            self.degraded.store(true, Ordering::SeqCst);
        } else {
            self.degraded.store(false, Ordering::SeqCst);
            tracing::info!(tools = tool_count, "gateway started");
        }

        Ok(())
    }

    /// Register one live connection's tools into the catalog, returning
    /// how many tools this provider declared.
    ///
    /// Public so in-memory providers can be injected directly (tests, or
    /// embedders with their own transports).
    pub async fn register_provider(&self, provider: Arc<dyn ProviderConnection>) -> Result<usize> {
        let provider_id = provider.id().to_string();
        let specs = provider.list_tools().await?;

        let declared: Vec<String> = specs.iter().map(|spec| spec.name.clone()).collect();
        self.provenance
            .write()
            .await
            .insert(provider_id.clone(), declared);

        let registered = specs.len();
        let mut tools = self.tools.write().await;
        for spec in specs {
            if let Some(previous) = tools.get(&spec.name) {
                tracing::warn!(
                    tool = %spec.name,
                    winner = %provider_id,
                    loser = %previous.provider_id,
                    "tool name collision; later registration wins"
                );
            }
            tools.insert(
                spec.name.clone(),
                RegisteredTool {
                    provider_id: provider_id.clone(),
                    spec,
                },
            );
        }
        drop(tools);

        self.providers
            .write()
            .await
            .insert(provider_id.clone(), provider);

        tracing::info!(provider = %provider_id, "provider registered");
        Ok(registered)
    }

    /// Current tool names, sorted
    pub async fn list_tools(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Catalog in the shape the inference call expects
    pub async fn tool_schemas(&self) -> Vec<ToolSchema> {
        let tools = self.tools.read().await;
        let mut schemas: Vec<ToolSchema> = tools
            .values()
            .map(|tool| ToolSchema {
                name: tool.spec.name.clone(),
                description: tool.spec.description.clone(),
                parameters: tool.spec.input_schema.clone(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Provider that currently backs a tool in the dispatch table
    pub async fn provider_for_tool(&self, name: &str) -> Option<String> {
        self.tools
            .read()
            .await
            .get(name)
            .map(|tool| tool.provider_id.clone())
    }

    /// Invoke a tool on behalf of `ctx`, bounded by `call_timeout`.
    ///
    /// A timeout releases the caller; it does not guarantee the
    /// underlying provider call was cancelled.
    pub async fn invoke(
        &self,
        ctx: &InvocationContext,
        name: &str,
        arguments: Value,
        call_timeout: Duration,
    ) -> Result<Value> {
        let (provider_id, provider) = {
            let tools = self.tools.read().await;
            let registered = tools.get(name).ok_or_else(|| GatewayError::ToolNotFound {
                name: name.to_string(),
            })?;
            let provider_id = registered.provider_id.clone();
            drop(tools);

            let providers = self.providers.read().await;
            let provider = providers.get(&provider_id).cloned().ok_or_else(|| {
                GatewayError::ProviderConnection {
                    provider: provider_id.clone(),
                    message: "provider connection is gone".to_string(),
                }
            })?;
            (provider_id, provider)
        };

        tracing::debug!(tool = %name, provider = %provider_id, session = %ctx.session_id, "invoking tool");

        let outcome = match timeout(call_timeout, provider.call_tool(name, arguments)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::ToolTimeout {
                name: name.to_string(),
                seconds: call_timeout.as_secs(),
            }
            .into()),
        };

        self.record_usage(ctx, name, outcome.is_ok()).await;
        outcome
    }

    /// Invoke with linearly backed-off retries; the last error is
    /// surfaced if every attempt fails.
    pub async fn invoke_with_retry(
        &self,
        ctx: &InvocationContext,
        name: &str,
        arguments: Value,
        options: RetryOptions,
    ) -> Result<Value> {
        let attempts = options.max_retries.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self
                .invoke(ctx, name, arguments.clone(), options.timeout)
                .await
            {
                Ok(result) => return Ok(result),
                Err(e) => {
                    tracing::warn!(tool = %name, attempt, "invocation failed: {}", e);
                    last_error = Some(e);
                    if attempt < attempts {
                        sleep(options.retry_delay * attempt).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            GatewayError::ExecutionFailed {
                name: name.to_string(),
                message: "no invocation attempt ran".to_string(),
            }
            .into()
        }))
    }

    /// Provenance map: provider id to the tool names it declared.
    ///
    /// Declared sets survive name collisions, so a collided tool appears
    /// under every provider that declared it. Tools present in the
    /// dispatch table but absent from every declared set (registered
    /// without provenance) are grouped by the name-pattern heuristic.
    pub async fn describe_providers(&self) -> HashMap<String, Vec<String>> {
        let mut groups: HashMap<String, Vec<String>> = self
            .provenance
            .read()
            .await
            .iter()
            .map(|(id, names)| {
                let mut names = names.clone();
                names.sort();
                (id.clone(), names)
            })
            .collect();

        let known: Vec<String> = groups.keys().cloned().collect();
        let attributed: std::collections::HashSet<&String> =
            groups.values().flatten().collect();
        let orphans: Vec<String> = self
            .tools
            .read()
            .await
            .keys()
            .filter(|name| !attributed.contains(name))
            .cloned()
            .collect();

        if !orphans.is_empty() {
            for (bucket, mut names) in provenance::infer_provenance(&orphans, &known) {
                groups.entry(bucket).or_default().append(&mut names);
            }
            for names in groups.values_mut() {
                names.sort();
            }
        }

        groups
    }

    /// Per-tool usage counters
    pub async fn usage_stats(&self) -> HashMap<String, ToolUsage> {
        self.usage.read().await.clone()
    }

    /// True when the gateway booted without a single usable tool
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Tear down every provider connection. Idempotent, and tolerant of
    /// partially-started state: whatever connections exist are shut down,
    /// and a second call finds nothing left to do.
    pub async fn shutdown(&self) {
        let providers: Vec<Arc<dyn ProviderConnection>> =
            self.providers.write().await.drain().map(|(_, p)| p).collect();

        for provider in providers {
            tracing::debug!(provider = %provider.id(), "shutting down provider");
            provider.shutdown().await;
        }

        self.tools.write().await.clear();
        self.provenance.write().await.clear();
        self.usage.write().await.clear();
    }

    async fn record_usage(&self, ctx: &InvocationContext, name: &str, success: bool) {
        let mut usage = self.usage.write().await;
        let entry = usage.entry(name.to_string()).or_default();
        entry.call_count += 1;
        if !success {
            entry.failure_count += 1;
        }
        entry.last_used = Some(Utc::now());
        entry.last_session = Some(ctx.session_id.clone());
    }
}

impl Default for ToolGateway {
    fn default() -> Self {
        Self::new()
    }
}

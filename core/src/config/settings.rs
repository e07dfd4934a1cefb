//! Tunable settings for sessions, persistence, the loop, and inference

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn default_max_messages() -> usize {
    100
}

fn default_max_sessions() -> usize {
    10
}

fn default_session_age_secs() -> u64 {
    3600
}

/// Limits enforced by the session store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionLimits {
    /// Message history cap per session; oldest messages are trimmed first
    #[serde(default = "default_max_messages")]
    pub max_messages_per_session: usize,

    /// Concurrent session cap per owner; creating one more evicts the
    /// owner's oldest session by `updated_at`
    #[serde(default = "default_max_sessions")]
    pub max_sessions_per_user: usize,

    /// Idle lifetime; a session expires when `now - updated_at` exceeds this
    #[serde(default = "default_session_age_secs")]
    pub max_session_age_secs: u64,
}

impl SessionLimits {
    pub fn max_session_age(&self) -> Duration {
        Duration::from_secs(self.max_session_age_secs)
    }

    /// Cadence for the expiry sweeper (half the session lifetime)
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs((self.max_session_age_secs / 2).max(1))
    }
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_messages_per_session: default_max_messages(),
            max_sessions_per_user: default_max_sessions(),
            max_session_age_secs: default_session_age_secs(),
        }
    }
}

fn default_flush_interval_secs() -> u64 {
    60
}

fn default_file_age_secs() -> u64 {
    7 * 24 * 3600
}

/// Session persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceSettings {
    /// Snapshot directory; defaults to the platform data dir
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,

    /// Interval between periodic flushes
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Stored records older than this are deleted lazily on load
    #[serde(default = "default_file_age_secs")]
    pub max_file_age_secs: u64,
}

impl PersistenceSettings {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn max_file_age(&self) -> Duration {
        Duration::from_secs(self.max_file_age_secs)
    }

    /// Storage directory, falling back to `<data_dir>/toolgate/sessions`
    pub fn storage_dir(&self) -> PathBuf {
        self.storage_dir.clone().unwrap_or_else(|| {
            let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
            path.push("toolgate");
            path.push("sessions");
            path
        })
    }
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            storage_dir: None,
            flush_interval_secs: default_flush_interval_secs(),
            max_file_age_secs: default_file_age_secs(),
        }
    }
}

fn default_max_iterations() -> usize {
    5
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_selection_temperature() -> f32 {
    0.2
}

fn default_synthesis_temperature() -> f32 {
    0.7
}

fn default_selection_max_tokens() -> u32 {
    4096
}

fn default_synthesis_max_tokens() -> u32 {
    8192
}

/// Conversation loop settings.
///
/// Tool-selection rounds run at low temperature for consistent tool
/// choice; the final synthesis round runs hotter with a larger output
/// budget to favor completeness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSettings {
    /// Upper bound on inference rounds that may request tools
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Per-tool-invocation timeout
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    #[serde(default = "default_selection_temperature")]
    pub selection_temperature: f32,

    #[serde(default = "default_synthesis_temperature")]
    pub synthesis_temperature: f32,

    #[serde(default = "default_selection_max_tokens")]
    pub selection_max_tokens: u32,

    #[serde(default = "default_synthesis_max_tokens")]
    pub synthesis_max_tokens: u32,
}

impl ConversationSettings {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tool_timeout_secs: default_tool_timeout_secs(),
            selection_temperature: default_selection_temperature(),
            synthesis_temperature: default_synthesis_temperature(),
            selection_max_tokens: default_selection_max_tokens(),
            synthesis_max_tokens: default_synthesis_max_tokens(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4".to_string()
}

/// Inference backend settings (OpenAI-compatible)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key; falls back to the OPENAI_API_KEY environment variable
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,
}

impl InferenceSettings {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
        }
    }
}

//! Session and message structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One message in a session's history, tagged by role.
///
/// A `tool_result` references a `tool_call_id` previously emitted by an
/// assistant message in the same session; the store passes messages
/// through in order and leaves that linkage to the inference contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: String,
        /// Tool-call metadata the inference layer attached, kept verbatim
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        content: String,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Message::ToolResult {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            content: content.into(),
        }
    }

    /// Text content of the message
    pub fn content(&self) -> &str {
        match self {
            Message::System { content }
            | Message::User { content }
            | Message::Assistant { content, .. }
            | Message::ToolResult { content, .. } => content,
        }
    }
}

/// A tool call requested by an assistant message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One conversation: owned message history plus metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque, unguessable identifier
    pub id: String,

    pub owner_id: String,

    pub messages: Vec<Message>,

    pub created_at: DateTime<Utc>,

    /// Refreshed on every read and write; access extends lifetime
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Session {
    pub fn new(owner_id: impl Into<String>, metadata: HashMap<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            metadata,
        }
    }
}

/// Aggregate counts over the session table
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub total_sessions: usize,
    pub total_owners: usize,
}

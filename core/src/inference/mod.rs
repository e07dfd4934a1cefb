//! Inference backends

mod openai;

pub use openai::OpenAiCompatClient;

use crate::error::Result;
use crate::session::{Message, ToolCallRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool advertised to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's arguments
    pub parameters: Value,
}

/// Per-request sampling knobs
#[derive(Debug, Clone, Copy)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// One model turn: its text, the assistant message to append to the
/// transcript, and any tool calls it requested.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub assistant_message: Message,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl Generation {
    pub fn from_parts(text: String, tool_calls: Vec<ToolCallRequest>) -> Self {
        let assistant_message = Message::Assistant {
            content: text.clone(),
            tool_calls: tool_calls.clone(),
        };
        Self {
            text,
            assistant_message,
            tool_calls,
        }
    }
}

/// Model backend abstraction. Passing `tools: None` forbids tool use
/// for that turn.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn generate(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
        options: GenerateOptions,
    ) -> Result<Generation>;

    fn model_name(&self) -> &str;
}

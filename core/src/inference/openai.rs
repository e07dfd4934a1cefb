//! OpenAI-compatible chat completions client

use super::{GenerateOptions, Generation, InferenceClient, ToolSchema};
use crate::config::InferenceSettings;
use crate::error::{InferenceError, Result};
use crate::session::{Message, ToolCallRequest};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client for any `/chat/completions` backend that speaks the OpenAI
/// wire format.
pub struct OpenAiCompatClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCompatClient {
    pub fn new(settings: &InferenceSettings) -> Result<Self> {
        let api_key = settings
            .resolved_api_key()
            .ok_or_else(|| InferenceError::Authentication {
                message: "no API key configured and OPENAI_API_KEY is unset".to_string(),
            })?;

        Ok(Self {
            client: Client::new(),
            api_key,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
        })
    }

    fn build_request(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
        options: GenerateOptions,
    ) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: messages.iter().map(wire_message).collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            tools: tools.map(|schemas| {
                schemas
                    .iter()
                    .map(|schema| WireTool {
                        tool_type: "function".to_string(),
                        function: WireFunction {
                            name: schema.name.clone(),
                            description: schema.description.clone(),
                            parameters: schema.parameters.clone(),
                        },
                    })
                    .collect()
            }),
        }
    }

    fn convert_response(&self, response: ChatResponse) -> Result<Generation> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| InferenceError::InvalidRequest {
                message: "response contained no choices".to_string(),
            })?;

        let text = choice.message.content.unwrap_or_default();
        let mut tool_calls = Vec::with_capacity(choice.message.tool_calls.len());
        for call in choice.message.tool_calls {
            // Arguments arrive as a JSON-encoded string
            let arguments: Value = serde_json::from_str(&call.function.arguments)
                .unwrap_or(Value::Object(Default::default()));
            tool_calls.push(ToolCallRequest {
                id: call.id,
                name: call.function.name,
                arguments,
            });
        }

        Ok(Generation::from_parts(text, tool_calls))
    }
}

#[async_trait]
impl InferenceClient for OpenAiCompatClient {
    async fn generate(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
        options: GenerateOptions,
    ) -> Result<Generation> {
        let request = self.build_request(messages, tools, options);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| InferenceError::Network {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(InferenceError::ApiError { status, message }.into());
        }

        let parsed: ChatResponse =
            response.json().await.map_err(|e| InferenceError::Network {
                message: format!("failed to parse response: {}", e),
            })?;

        self.convert_response(parsed)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn wire_message(message: &Message) -> WireMessage {
    match message {
        Message::System { content } => WireMessage {
            role: "system".to_string(),
            content: Some(content.clone()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        },
        Message::User { content } => WireMessage {
            role: "user".to_string(),
            content: Some(content.clone()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        },
        Message::Assistant {
            content,
            tool_calls,
        } => WireMessage {
            role: "assistant".to_string(),
            content: if content.is_empty() {
                None
            } else {
                Some(content.clone())
            },
            tool_calls: tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    call_type: "function".to_string(),
                    function: WireCallFunction {
                        name: call.name.clone(),
                        arguments: call.arguments.to_string(),
                    },
                })
                .collect(),
            tool_call_id: None,
        },
        Message::ToolResult {
            tool_call_id,
            content,
            ..
        } => WireMessage {
            role: "tool".to_string(),
            content: Some(content.clone()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.clone()),
        },
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: WireCallFunction,
}

#[derive(Debug, Serialize)]
struct WireCallFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    id: String,
    function: ResponseCallFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseCallFunction {
    name: String,
    arguments: String,
}

//! Bounded tool-use conversation loop

use crate::config::ConversationSettings;
use crate::error::{Result, SessionError};
use crate::gateway::{InvocationContext, ToolGateway};
use crate::inference::{GenerateOptions, InferenceClient, ToolSchema};
use crate::provider::result_text;
use crate::session::{Message, SessionStore};
use std::sync::Arc;

/// Instruction appended before the first reasoning round to bias the
/// model toward consistent multi-tool behavior.
const STEERING_PROMPT: &str = "Use the available tools as needed to answer. \
Treat every tool result as real data, including reported failures. \
When you have gathered enough, synthesize a comprehensive final answer.";

/// Progress of a single loop run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Reasoning,
    ToolsRequested,
    Executing,
    Synthesizing,
    Done,
}

/// Result of one tool invocation within a run
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    Success(String),
    Failure(String),
}

impl ToolOutcome {
    pub fn text(&self) -> &str {
        match self {
            ToolOutcome::Success(text) | ToolOutcome::Failure(text) => text,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success(_))
    }
}

/// One tool invocation, ordered by its global sequence number
#[derive(Debug, Clone)]
pub struct ToolInvocationRecord {
    pub tool_name: String,
    /// 1-based position across the whole run, not per round
    pub sequence: u64,
    /// Total invocations in the run, so one entry can render "step 3 of 7"
    pub total_steps: u64,
    pub provider_id: Option<String>,
    pub outcome: ToolOutcome,
}

/// What a completed run hands back to the caller
#[derive(Debug, Clone)]
pub struct ConversationOutcome {
    /// Text of the first reasoning round
    pub initial_response: String,
    pub tool_results: Vec<ToolInvocationRecord>,
    /// Text of the synthesis round; empty when the model produced none
    pub final_response: String,
}

/// Drives inference rounds against a session, executing requested tool
/// calls through the gateway until the model stops asking or the round
/// budget runs out, then synthesizes a final answer without tools.
pub struct ConversationLoop {
    inference: Arc<dyn InferenceClient>,
    gateway: Arc<ToolGateway>,
    store: Arc<SessionStore>,
    settings: ConversationSettings,
}

impl ConversationLoop {
    pub fn new(
        inference: Arc<dyn InferenceClient>,
        gateway: Arc<ToolGateway>,
        store: Arc<SessionStore>,
        settings: ConversationSettings,
    ) -> Self {
        Self {
            inference,
            gateway,
            store,
            settings,
        }
    }

    /// Run one user turn to completion.
    ///
    /// Tool failures are folded into the transcript as data and never
    /// abort the run; only inference transport failures and an unknown
    /// session id are errors.
    pub async fn run(&self, session_id: &str, user_text: &str) -> Result<ConversationOutcome> {
        let session =
            self.store
                .get(session_id)
                .await
                .ok_or_else(|| SessionError::NotFound {
                    id: session_id.to_string(),
                })?;
        let ctx = InvocationContext::new(session_id, &session.owner_id);

        let mut history = session.messages;
        self.append(session_id, &mut history, Message::user(user_text))
            .await;
        self.append(session_id, &mut history, Message::user(STEERING_PROMPT))
            .await;

        let schemas = self.gateway.tool_schemas().await;
        let catalog: Option<&[ToolSchema]> = if schemas.is_empty() {
            None
        } else {
            Some(&schemas)
        };
        let selection = GenerateOptions {
            temperature: self.settings.selection_temperature,
            max_tokens: self.settings.selection_max_tokens,
        };

        let mut initial_response = String::new();
        let mut tool_results = Vec::new();
        let mut sequence = 0u64;

        for round in 1..=self.settings.max_iterations {
            tracing::trace!(round, state = ?LoopState::Reasoning, "starting round");
            let generation = self.inference.generate(&history, catalog, selection).await?;

            if round == 1 {
                initial_response = generation.text.clone();
            }
            // The assistant message is preserved verbatim, tool-call
            // metadata included
            self.append(session_id, &mut history, generation.assistant_message.clone())
                .await;

            if generation.tool_calls.is_empty() {
                break;
            }

            tracing::trace!(
                round,
                state = ?LoopState::Executing,
                calls = generation.tool_calls.len(),
                "executing requested tools"
            );
            for call in &generation.tool_calls {
                sequence += 1;
                let provider_id = self.gateway.provider_for_tool(&call.name).await;
                let outcome = match self
                    .gateway
                    .invoke(&ctx, &call.name, call.arguments.clone(), self.settings.tool_timeout())
                    .await
                {
                    Ok(value) => ToolOutcome::Success(result_text(&value)),
                    Err(e) => {
                        tracing::warn!(tool = %call.name, sequence, "tool call failed: {}", e);
                        ToolOutcome::Failure(e.to_string())
                    }
                };

                self.append(
                    session_id,
                    &mut history,
                    Message::tool_result(&call.id, &call.name, outcome.text()),
                )
                .await;
                tool_results.push(ToolInvocationRecord {
                    tool_name: call.name.clone(),
                    sequence,
                    // Filled in once the run's total is known
                    total_steps: 0,
                    provider_id,
                    outcome,
                });
            }
        }

        let total_steps = sequence;
        for record in &mut tool_results {
            record.total_steps = total_steps;
        }

        // Round budget exhausted or the model stopped asking; either way
        // synthesize from whatever was gathered.
        tracing::trace!(state = ?LoopState::Synthesizing, results = tool_results.len(), "synthesizing");
        let synthesis_prompt = format!(
            "Synthesize a comprehensive final answer from the {} tool result(s) above.",
            tool_results.len()
        );
        self.append(session_id, &mut history, Message::user(synthesis_prompt))
            .await;

        let synthesis = self
            .inference
            .generate(
                &history,
                None,
                GenerateOptions {
                    temperature: self.settings.synthesis_temperature,
                    max_tokens: self.settings.synthesis_max_tokens,
                },
            )
            .await?;
        self.append(session_id, &mut history, synthesis.assistant_message.clone())
            .await;

        tracing::debug!(
            state = ?LoopState::Done,
            tool_calls = tool_results.len(),
            "conversation run complete"
        );

        Ok(ConversationOutcome {
            initial_response,
            tool_results,
            final_response: synthesis.text,
        })
    }

    async fn append(&self, session_id: &str, history: &mut Vec<Message>, message: Message) {
        history.push(message.clone());
        if !self.store.append_message(session_id, message).await {
            tracing::warn!(session = %session_id, "session vanished mid-run; keeping local history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionLimits;
    use crate::error::{Error, GatewayError};
    use crate::inference::Generation;
    use crate::provider::{ProviderConnection, ToolSpec, TransportKind};
    use crate::session::ToolCallRequest;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::{HashMap, VecDeque};
    use tokio::sync::Mutex;

    struct MockInference {
        script: Mutex<VecDeque<Generation>>,
        /// Whether each call offered tools
        offered_tools: Mutex<Vec<bool>>,
    }

    impl MockInference {
        fn scripted(rounds: Vec<Generation>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(rounds.into()),
                offered_tools: Mutex::new(Vec::new()),
            })
        }

        fn round(text: &str, calls: Vec<(&str, &str, Value)>) -> Generation {
            Generation::from_parts(
                text.to_string(),
                calls
                    .into_iter()
                    .map(|(id, name, arguments)| ToolCallRequest {
                        id: id.to_string(),
                        name: name.to_string(),
                        arguments,
                    })
                    .collect(),
            )
        }

        async fn call_count(&self) -> usize {
            self.offered_tools.lock().await.len()
        }
    }

    #[async_trait]
    impl InferenceClient for MockInference {
        async fn generate(
            &self,
            _messages: &[Message],
            tools: Option<&[ToolSchema]>,
            _options: GenerateOptions,
        ) -> Result<Generation> {
            self.offered_tools.lock().await.push(tools.is_some());
            Ok(self
                .script
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Generation::from_parts(String::new(), Vec::new())))
        }

        fn model_name(&self) -> &str {
            "mock"
        }
    }

    struct ScriptedProvider {
        id: String,
        tools: Vec<ToolSpec>,
        answers: HashMap<String, Value>,
    }

    impl ScriptedProvider {
        fn new(id: &str, answers: Vec<(&str, Value)>) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                tools: answers
                    .iter()
                    .map(|(name, _)| ToolSpec {
                        name: name.to_string(),
                        description: format!("{} tool", name),
                        input_schema: json!({"type": "object"}),
                    })
                    .collect(),
                answers: answers
                    .into_iter()
                    .map(|(name, value)| (name.to_string(), value))
                    .collect(),
            })
        }

        fn text_result(text: &str) -> Value {
            json!({"content": [{"type": "text", "text": text}]})
        }
    }

    #[async_trait]
    impl ProviderConnection for ScriptedProvider {
        fn id(&self) -> &str {
            &self.id
        }

        fn transport(&self) -> TransportKind {
            TransportKind::Process
        }

        async fn list_tools(&self) -> Result<Vec<ToolSpec>> {
            Ok(self.tools.clone())
        }

        async fn call_tool(&self, name: &str, _arguments: Value) -> Result<Value> {
            match self.answers.get(name) {
                Some(value) => Ok(value.clone()),
                None => Err(Error::Gateway(GatewayError::ExecutionFailed {
                    name: name.to_string(),
                    message: "scripted failure".to_string(),
                })),
            }
        }

        async fn shutdown(&self) {}
    }

    async fn harness(
        inference: Arc<MockInference>,
        providers: Vec<Arc<ScriptedProvider>>,
    ) -> (ConversationLoop, Arc<SessionStore>, String) {
        let gateway = Arc::new(ToolGateway::new());
        for provider in providers {
            gateway.register_provider(provider).await.unwrap();
        }

        let store = Arc::new(SessionStore::new(SessionLimits::default()));
        let session = store.create("alice", HashMap::new()).await;

        let settings = ConversationSettings {
            max_iterations: 3,
            tool_timeout_secs: 5,
            ..Default::default()
        };
        (
            ConversationLoop::new(inference, gateway, store.clone(), settings),
            store,
            session.id,
        )
    }

    #[tokio::test]
    async fn unknown_session_is_an_error() {
        let inference = MockInference::scripted(vec![]);
        let (conv, _store, _id) = harness(inference, vec![]).await;

        let err = conv.run("missing", "hello").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Session(SessionError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn two_providers_feed_one_synthesis() {
        let calc = ScriptedProvider::new(
            "calc",
            vec![("calc.add", ScriptedProvider::text_result("3"))],
        );
        let geo = ScriptedProvider::new(
            "geo",
            vec![("geo.lookup", ScriptedProvider::text_result("Paris"))],
        );
        let inference = MockInference::scripted(vec![
            MockInference::round(
                "Looking that up.",
                vec![
                    ("c1", "calc.add", json!({"a": 1, "b": 2})),
                    ("c2", "geo.lookup", json!({"q": "capital of France"})),
                ],
            ),
            MockInference::round("I have what I need.", vec![]),
            MockInference::round("1 + 2 is 3, and the capital is Paris.", vec![]),
        ]);

        let (conv, _store, session_id) = harness(inference.clone(), vec![calc, geo]).await;
        let outcome = conv.run(&session_id, "add 1+2 and find the capital").await.unwrap();

        assert_eq!(outcome.initial_response, "Looking that up.");
        assert_eq!(outcome.final_response, "1 + 2 is 3, and the capital is Paris.");
        assert_eq!(outcome.tool_results.len(), 2);
        assert!(outcome.tool_results[0].outcome.is_success());
        assert_eq!(outcome.tool_results[0].outcome.text(), "3");
        assert_eq!(outcome.tool_results[1].outcome.text(), "Paris");
        assert_eq!(
            outcome.tool_results[0].provider_id.as_deref(),
            Some("calc")
        );
        assert_eq!(outcome.tool_results[0].total_steps, 2);
        assert_eq!(outcome.tool_results[1].total_steps, 2);

        // Two selection rounds plus the synthesis round
        assert_eq!(inference.call_count().await, 3);
        // Synthesis never offers tools
        assert!(!inference.offered_tools.lock().await.last().copied().unwrap());
    }

    #[tokio::test]
    async fn sequence_numbers_are_global_across_rounds() {
        let calc = ScriptedProvider::new(
            "calc",
            vec![("calc.add", ScriptedProvider::text_result("ok"))],
        );
        let inference = MockInference::scripted(vec![
            MockInference::round(
                "round one",
                vec![
                    ("c1", "calc.add", json!({})),
                    ("c2", "calc.add", json!({})),
                ],
            ),
            MockInference::round("round two", vec![("c3", "calc.add", json!({}))]),
            MockInference::round("done", vec![]),
            MockInference::round("final", vec![]),
        ]);

        let (conv, _store, session_id) = harness(inference, vec![calc]).await;
        let outcome = conv.run(&session_id, "go").await.unwrap();

        let sequences: Vec<u64> = outcome.tool_results.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        // Every record carries the run-wide step total
        assert!(outcome.tool_results.iter().all(|r| r.total_steps == 3));
    }

    #[tokio::test]
    async fn round_budget_bounds_inference_calls() {
        let calc = ScriptedProvider::new(
            "calc",
            vec![("calc.add", ScriptedProvider::text_result("ok"))],
        );
        // The model never stops asking
        let rounds: Vec<Generation> = (0..10)
            .map(|_| MockInference::round("more", vec![("c", "calc.add", json!({}))]))
            .collect();
        let inference = MockInference::scripted(rounds);

        let (conv, _store, session_id) = harness(inference.clone(), vec![calc]).await;
        let outcome = conv.run(&session_id, "loop forever").await.unwrap();

        // max_iterations selection rounds plus the single synthesis call
        assert_eq!(inference.call_count().await, 4);
        assert_eq!(outcome.tool_results.len(), 3);
    }

    #[tokio::test]
    async fn unknown_tool_becomes_failure_data_and_run_completes() {
        let inference = MockInference::scripted(vec![
            MockInference::round("trying", vec![("c1", "ghost.tool", json!({}))]),
            MockInference::round("ok then", vec![]),
            MockInference::round("no such tool existed", vec![]),
        ]);

        let (conv, store, session_id) = harness(inference, vec![]).await;
        let outcome = conv.run(&session_id, "use the ghost").await.unwrap();

        assert_eq!(outcome.tool_results.len(), 1);
        assert!(!outcome.tool_results[0].outcome.is_success());
        assert!(outcome.tool_results[0].provider_id.is_none());
        assert_eq!(outcome.final_response, "no such tool existed");

        // The failure landed in the transcript as a tool_result message
        let session = store.get(&session_id).await.unwrap();
        assert!(session.messages.iter().any(|m| matches!(
            m,
            Message::ToolResult { tool_name, .. } if tool_name == "ghost.tool"
        )));
    }

    #[tokio::test]
    async fn all_failures_still_reach_synthesis() {
        let broken = ScriptedProvider::new("broken", vec![]);
        let inference = MockInference::scripted(vec![
            MockInference::round("trying", vec![("c1", "broken.op", json!({}))]),
            MockInference::round("giving up", vec![]),
            MockInference::round("everything failed", vec![]),
        ]);

        let (conv, _store, session_id) = harness(inference, vec![broken]).await;
        let outcome = conv.run(&session_id, "go").await.unwrap();

        assert!(outcome.tool_results.iter().all(|r| !r.outcome.is_success()));
        assert_eq!(outcome.final_response, "everything failed");
    }

    #[tokio::test]
    async fn empty_model_text_degrades_to_empty_strings() {
        let inference = MockInference::scripted(vec![
            MockInference::round("", vec![]),
            MockInference::round("", vec![]),
        ]);

        let (conv, _store, session_id) = harness(inference, vec![]).await;
        let outcome = conv.run(&session_id, "say nothing").await.unwrap();

        assert_eq!(outcome.initial_response, "");
        assert_eq!(outcome.final_response, "");
        assert!(outcome.tool_results.is_empty());
    }
}

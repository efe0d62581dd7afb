//! Tool-calling agent
//!
//! An [`Agent`] pairs one persona with a backend and the persona's tools.
//! A run streams model turns, forwards text as it arrives, executes any
//! requested tools and feeds their results back until the model finishes.

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use desk_tools::Toolbox;

use crate::{
    AgentError, ChatMessage, FragmentStream, LlmError, PersonaConfig, RunResponse, SharedBackend,
    StopReason, ToolCall, ToolResult, TurnEvent, TurnRequest,
};

/// Maximum tool rounds per run
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

/// Fragments buffered between the run task and the consumer
const FRAGMENT_BUFFER: usize = 64;

type FragmentSender = mpsc::Sender<Result<RunResponse, AgentError>>;

/// A persona bound to a backend and its tools
pub struct Agent {
    config: PersonaConfig,
    backend: SharedBackend,
    toolbox: Arc<Toolbox>,
    history: Vec<ChatMessage>,
    max_tool_rounds: usize,
}

impl Agent {
    pub fn new(config: PersonaConfig, backend: SharedBackend, toolbox: Toolbox) -> Self {
        Self {
            config,
            backend,
            toolbox: Arc::new(toolbox),
            history: Vec::new(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn config(&self) -> &PersonaConfig {
        &self.config
    }

    /// Messages kept from earlier runs (only when history is enabled)
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Run in a background task and stream the answer
    ///
    /// Dropping the returned stream stops the run at its next fragment.
    pub fn run_stream(mut self, input: &str) -> FragmentStream {
        let (tx, rx) = mpsc::channel(FRAGMENT_BUFFER);
        let input = input.to_string();

        tokio::spawn(async move {
            // A panic in the run reaches the consumer as AgentError::Task
            let run_tx = tx.clone();
            let run = tokio::spawn(async move { self.run(&input, &run_tx).await });

            let outcome = match run.await {
                Ok(result) => result,
                Err(e) => {
                    error!("Agent task failed: {}", e);
                    Err(AgentError::Task(e.to_string()))
                }
            };

            match outcome {
                Ok(()) | Err(AgentError::Cancelled) => {}
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        ReceiverStream::new(rx).boxed()
    }

    /// Run to completion, sending each text fragment to `tx`
    pub async fn run(&mut self, input: &str, tx: &FragmentSender) -> Result<(), AgentError> {
        let system = self.config.system_prompt();
        let tools = self.toolbox.definitions();

        let mut messages = if self.config.history_enabled {
            self.history.clone()
        } else {
            Vec::new()
        };
        messages.push(ChatMessage::User(input.to_string()));

        info!(
            "{} running via {} ({} tools, {} prior messages)",
            self.config.name,
            self.backend.provider(),
            tools.len(),
            messages.len() - 1
        );

        for round in 0..=self.max_tool_rounds {
            let request = TurnRequest {
                model: &self.config.model,
                system: &system,
                messages: &messages,
                tools: &tools,
            };
            let mut turn = self.backend.stream_turn(&request).await?;

            let mut text = String::new();
            let mut tool_calls = Vec::new();
            let mut stop = None;

            while let Some(event) = turn.next().await {
                match event? {
                    TurnEvent::Text(delta) => {
                        text.push_str(&delta);
                        tx.send(Ok(RunResponse::new(delta)))
                            .await
                            .map_err(|_| AgentError::Cancelled)?;
                    }
                    TurnEvent::ToolCall(call) => tool_calls.push(call),
                    TurnEvent::Finished(reason) => {
                        stop = Some(reason);
                        break;
                    }
                }
            }

            let stop = stop.ok_or_else(|| {
                LlmError::Malformed("turn ended without a stop reason".to_string())
            })?;
            debug!("{} turn {} finished: {:?}", self.config.name, round, stop);

            messages.push(ChatMessage::Assistant {
                text,
                tool_calls: tool_calls.clone(),
            });

            if tool_calls.is_empty() {
                if stop == StopReason::MaxTokens {
                    warn!("{} answer truncated at max tokens", self.config.name);
                }
                if self.config.history_enabled {
                    self.history = messages;
                }
                return Ok(());
            }

            if round == self.max_tool_rounds {
                break;
            }

            let mut results = Vec::with_capacity(tool_calls.len());
            for call in &tool_calls {
                results.push(self.execute_tool(call).await);
            }
            messages.push(ChatMessage::ToolResults(results));
        }

        Err(AgentError::ToolLoop(self.max_tool_rounds))
    }

    /// Run one tool; failures go back to the model as error results
    async fn execute_tool(&self, call: &ToolCall) -> ToolResult {
        info!("{} calling tool {}", self.config.name, call.name);
        debug!("Tool input: {}", call.input);

        match self.toolbox.call(&call.name, &call.input).await {
            Ok(content) => ToolResult {
                call_id: call.id.clone(),
                content,
                is_error: false,
            },
            Err(e) => {
                warn!("Tool {} failed: {}", call.name, e);
                ToolResult {
                    call_id: call.id.clone(),
                    content: format!("Error: {}", e),
                    is_error: true,
                }
            }
        }
    }
}

//! OpenAI-compatible backend (OpenAI, OpenRouter, local servers)

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolType,
        CreateChatCompletionRequestArgs, FinishReason, FunctionCall, FunctionObjectArgs,
    },
    Client,
};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use tracing::debug;

use crate::{
    ChatMessage, LlmBackend, LlmError, OpenAIBackendConfig, StopReason, ToolCall, TurnEvent,
    TurnRequest, TurnStream,
};

/// OpenAI-compatible LLM backend
pub struct OpenAIBackend {
    client: Client<OpenAIConfig>,
    config: OpenAIBackendConfig,
}

impl OpenAIBackend {
    pub fn new(config: OpenAIBackendConfig) -> Result<Self, LlmError> {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);

        if let Some(base_url) = &config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Config(format!("failed to build HTTP client: {}", e)))?;
        let client = Client::with_config(openai_config).with_http_client(http_client);

        Ok(Self { client, config })
    }

    fn build_messages(&self, request: &TurnRequest<'_>) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        let mut messages = vec![ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system)
                .build()
                .map_err(api_error)?,
        )];

        for message in request.messages {
            match message {
                ChatMessage::User(text) => messages.push(ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(text.as_str())
                        .build()
                        .map_err(api_error)?,
                )),
                ChatMessage::Assistant { text, tool_calls } => {
                    let mut args = ChatCompletionRequestAssistantMessageArgs::default();
                    if !text.is_empty() {
                        args.content(text.as_str());
                    }
                    if !tool_calls.is_empty() {
                        args.tool_calls(
                            tool_calls
                                .iter()
                                .map(|call| ChatCompletionMessageToolCall {
                                    id: call.id.clone(),
                                    r#type: ChatCompletionToolType::Function,
                                    function: FunctionCall {
                                        name: call.name.clone(),
                                        arguments: call.input.to_string(),
                                    },
                                })
                                .collect::<Vec<_>>(),
                        );
                    }
                    messages.push(ChatCompletionRequestMessage::Assistant(
                        args.build().map_err(api_error)?,
                    ));
                }
                ChatMessage::ToolResults(results) => {
                    for result in results {
                        messages.push(ChatCompletionRequestMessage::Tool(
                            ChatCompletionRequestToolMessageArgs::default()
                                .content(result.content.as_str())
                                .tool_call_id(result.call_id.as_str())
                                .build()
                                .map_err(api_error)?,
                        ));
                    }
                }
            }
        }

        Ok(messages)
    }

    fn build_tools(&self, request: &TurnRequest<'_>) -> Result<Vec<ChatCompletionTool>, LlmError> {
        request
            .tools
            .iter()
            .map(|def| {
                ChatCompletionToolArgs::default()
                    .r#type(ChatCompletionToolType::Function)
                    .function(
                        FunctionObjectArgs::default()
                            .name(def.name.as_str())
                            .description(def.description.as_str())
                            .parameters(def.input_schema.clone())
                            .build()
                            .map_err(api_error)?,
                    )
                    .build()
                    .map_err(api_error)
            })
            .collect()
    }
}

fn api_error(e: impl std::fmt::Display) -> LlmError {
    LlmError::Api(e.to_string())
}

#[async_trait]
impl LlmBackend for OpenAIBackend {
    async fn stream_turn(&self, request: &TurnRequest<'_>) -> Result<TurnStream, LlmError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(request.model)
            .messages(self.build_messages(request)?)
            .temperature(self.config.temperature)
            .max_tokens(self.config.max_tokens);

        if !request.tools.is_empty() {
            args.tools(self.build_tools(request)?);
        }

        let chat_request = args.build().map_err(api_error)?;
        debug!(
            "OpenAI turn: model={} messages={} tools={}",
            request.model,
            request.messages.len(),
            request.tools.len()
        );

        let chunks = self
            .client
            .chat()
            .create_stream(chat_request)
            .await
            .map_err(api_error)?;

        let pending: VecDeque<Result<TurnEvent, LlmError>> = VecDeque::new();
        let state = (chunks, ToolCallAccumulator::default(), pending, false);

        let events = stream::unfold(state, |(mut chunks, mut calls, mut pending, mut finished)| async move {
            loop {
                if let Some(item) = pending.pop_front() {
                    return Some((item, (chunks, calls, pending, finished)));
                }
                if finished {
                    return None;
                }

                match chunks.next().await {
                    Some(Ok(chunk)) => {
                        // Only the first choice is requested
                        let Some(choice) = chunk.choices.into_iter().next() else {
                            continue;
                        };
                        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                            pending.push_back(Ok(TurnEvent::Text(text)));
                        }
                        for call in choice.delta.tool_calls.unwrap_or_default() {
                            let function = call.function.as_ref();
                            calls.push(
                                call.index,
                                call.id.as_deref(),
                                function.and_then(|f| f.name.as_deref()),
                                function.and_then(|f| f.arguments.as_deref()),
                            );
                        }
                        if let Some(reason) = choice.finish_reason {
                            pending.extend(finish_turn(&mut calls, Some(reason)));
                            finished = true;
                        }
                    }
                    Some(Err(e)) => {
                        pending.push_back(Err(LlmError::Api(e.to_string())));
                        finished = true;
                    }
                    None => {
                        // Some compatible servers close without a finish reason
                        pending.extend(finish_turn(&mut calls, None));
                        finished = true;
                    }
                }
            }
        });

        Ok(events.boxed())
    }

    fn provider(&self) -> &str {
        "openai"
    }
}

fn finish_turn(
    calls: &mut ToolCallAccumulator,
    reason: Option<FinishReason>,
) -> Vec<Result<TurnEvent, LlmError>> {
    let tool_calls = match std::mem::take(calls).finish() {
        Ok(tool_calls) => tool_calls,
        Err(e) => return vec![Err(e)],
    };

    let stop = if !tool_calls.is_empty() {
        StopReason::ToolUse
    } else {
        match reason {
            Some(FinishReason::Length) => StopReason::MaxTokens,
            Some(FinishReason::ContentFilter) => StopReason::Other("content_filter".to_string()),
            _ => StopReason::EndTurn,
        }
    };

    tool_calls
        .into_iter()
        .map(|call| Ok(TurnEvent::ToolCall(call)))
        .chain(std::iter::once(Ok(TurnEvent::Finished(stop))))
        .collect()
}

/// Reassembles tool calls streamed as per-index fragments
#[derive(Debug, Default)]
pub(crate) struct ToolCallAccumulator {
    calls: BTreeMap<i32, PartialCall>,
}

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    pub(crate) fn push(&mut self, index: i32, id: Option<&str>, name: Option<&str>, arguments: Option<&str>) {
        let call = self.calls.entry(index).or_default();
        if let Some(id) = id {
            call.id = id.to_string();
        }
        if let Some(name) = name {
            call.name.push_str(name);
        }
        if let Some(arguments) = arguments {
            call.arguments.push_str(arguments);
        }
    }

    /// Completed calls in index order
    pub(crate) fn finish(self) -> Result<Vec<ToolCall>, LlmError> {
        self.calls
            .into_iter()
            .map(|(index, call)| {
                if call.name.is_empty() {
                    return Err(LlmError::Malformed(format!("tool call {} has no name", index)));
                }
                let input: Value = if call.arguments.trim().is_empty() {
                    json!({})
                } else {
                    serde_json::from_str(&call.arguments).map_err(|e| {
                        LlmError::Malformed(format!("arguments for {}: {}", call.name, e))
                    })?
                };
                let id = if call.id.is_empty() {
                    format!("call_{}", index)
                } else {
                    call.id
                };
                Ok(ToolCall {
                    id,
                    name: call.name,
                    input,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_fragments_per_index() {
        let mut acc = ToolCallAccumulator::default();
        acc.push(0, Some("call_a"), Some("duckduckgo_search"), Some(""));
        acc.push(1, Some("call_b"), Some("get_company_news"), Some("{\"symbol\":"));
        acc.push(0, None, None, Some("{\"query\": \"rust"));
        acc.push(1, None, None, Some("\"ACME\"}"));
        acc.push(0, None, None, Some(" news\"}"));

        let calls = acc.finish().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].input, json!({"query": "rust news"}));
        assert_eq!(calls[1].name, "get_company_news");
        assert_eq!(calls[1].input, json!({"symbol": "ACME"}));
    }

    #[test]
    fn test_missing_id_and_empty_arguments() {
        let mut acc = ToolCallAccumulator::default();
        acc.push(3, None, Some("get_current_stock_price"), None);

        let calls = acc.finish().unwrap();
        assert_eq!(calls[0].id, "call_3");
        assert_eq!(calls[0].input, json!({}));
    }

    #[test]
    fn test_bad_arguments_are_malformed() {
        let mut acc = ToolCallAccumulator::default();
        acc.push(0, Some("c"), Some("search_exa"), Some("{\"query\": "));
        assert!(matches!(acc.finish(), Err(LlmError::Malformed(_))));
    }

    #[test]
    fn test_chunk_indices_keep_stream_order() {
        let mut acc = ToolCallAccumulator::default();
        acc.push(2, Some("late"), Some("search_exa"), Some("{}"));
        acc.push(0, Some("early"), Some("duckduckgo_search"), Some("{}"));

        let ids: Vec<_> = acc.finish().unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn test_backend_builds_with_timeout() {
        let config = OpenAIBackendConfig {
            timeout_secs: 5,
            ..OpenAIBackendConfig::local("http://localhost:11434/v1")
        };
        let backend = OpenAIBackend::new(config).unwrap();
        assert_eq!(backend.config.timeout_secs, 5);
        assert_eq!(backend.provider(), "openai");
    }

    #[test]
    fn test_finish_turn_prefers_tool_use() {
        let mut acc = ToolCallAccumulator::default();
        acc.push(0, Some("c"), Some("search_exa"), Some("{}"));

        let events = finish_turn(&mut acc, Some(FinishReason::Stop));
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Ok(TurnEvent::ToolCall(c)) if c.name == "search_exa"));
        assert!(matches!(&events[1], Ok(TurnEvent::Finished(StopReason::ToolUse))));

        let events = finish_turn(&mut acc, Some(FinishReason::Length));
        assert!(matches!(&events[0], Ok(TurnEvent::Finished(StopReason::MaxTokens))));
    }
}

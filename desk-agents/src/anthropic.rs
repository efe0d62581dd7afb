//! Anthropic Messages API backend with streaming and tool use

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::{debug, trace};

use crate::sse::{SseDecoder, SseEvent};
use crate::{
    AnthropicConfig, ChatMessage, LlmBackend, LlmError, StopReason, TurnEvent, TurnRequest,
    TurnStream,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Claude backend
pub struct AnthropicBackend {
    client: reqwest::Client,
    config: AnthropicConfig,
}

impl AnthropicBackend {
    pub fn new(config: AnthropicConfig) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::Config("Anthropic API key is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    async fn stream_turn(&self, request: &TurnRequest<'_>) -> Result<TurnStream, LlmError> {
        let body = request_body(request, self.config.max_tokens);
        debug!(
            "Anthropic turn: model={} messages={} tools={}",
            request.model,
            request.messages.len(),
            request.tools.len()
        );

        let response = self
            .client
            .post(&self.config.base_url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("Anthropic API error {}: {}", status, text)));
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(|e| LlmError::Network(e.to_string())))
            .boxed();

        Ok(turn_stream(bytes))
    }

    fn provider(&self) -> &str {
        "anthropic"
    }
}

/// Build the JSON body of a streaming Messages request
pub(crate) fn request_body(request: &TurnRequest<'_>, max_tokens: u32) -> Value {
    let messages: Vec<Value> = request.messages.iter().map(message_json).collect();

    let mut body = json!({
        "model": request.model,
        "max_tokens": max_tokens,
        "system": request.system,
        "messages": messages,
        "stream": true,
    });

    if !request.tools.is_empty() {
        body["tools"] = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.input_schema,
                })
            })
            .collect();
    }

    body
}

fn message_json(message: &ChatMessage) -> Value {
    match message {
        ChatMessage::User(text) => json!({"role": "user", "content": text}),
        ChatMessage::Assistant { text, tool_calls } => {
            let mut content = Vec::new();
            if !text.is_empty() {
                content.push(json!({"type": "text", "text": text}));
            }
            for call in tool_calls {
                content.push(json!({
                    "type": "tool_use",
                    "id": call.id,
                    "name": call.name,
                    "input": call.input,
                }));
            }
            json!({"role": "assistant", "content": content})
        }
        ChatMessage::ToolResults(results) => {
            let content: Vec<Value> = results
                .iter()
                .map(|r| {
                    json!({
                        "type": "tool_result",
                        "tool_use_id": r.call_id,
                        "content": r.content,
                        "is_error": r.is_error,
                    })
                })
                .collect();
            json!({"role": "user", "content": content})
        }
    }
}

/// A tool_use block whose input JSON is still arriving
#[derive(Debug)]
struct PendingToolUse {
    id: String,
    name: String,
    input_json: String,
}

/// Translates Messages API stream events into turn events
#[derive(Debug, Default)]
pub(crate) struct EventTranslator {
    tool_blocks: HashMap<u64, PendingToolUse>,
    stop_reason: Option<StopReason>,
    done: bool,
}

impl EventTranslator {
    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    pub(crate) fn handle(&mut self, event: &SseEvent) -> Result<Vec<TurnEvent>, LlmError> {
        let data: Value = serde_json::from_str(&event.data)
            .map_err(|e| LlmError::Malformed(format!("invalid event JSON: {}", e)))?;
        let kind = data["type"].as_str().or(event.event.as_deref()).unwrap_or_default();
        trace!("Anthropic event: {}", kind);

        let mut out = Vec::new();
        match kind {
            "content_block_start" => {
                let index = block_index(&data)?;
                let block = &data["content_block"];
                match block["type"].as_str() {
                    Some("tool_use") => {
                        self.tool_blocks.insert(
                            index,
                            PendingToolUse {
                                id: block["id"].as_str().unwrap_or_default().to_string(),
                                name: block["name"].as_str().unwrap_or_default().to_string(),
                                input_json: String::new(),
                            },
                        );
                    }
                    Some("text") => {
                        if let Some(text) = block["text"].as_str().filter(|t| !t.is_empty()) {
                            out.push(TurnEvent::Text(text.to_string()));
                        }
                    }
                    _ => {}
                }
            }
            "content_block_delta" => {
                let index = block_index(&data)?;
                let delta = &data["delta"];
                match delta["type"].as_str() {
                    Some("text_delta") => {
                        if let Some(text) = delta["text"].as_str().filter(|t| !t.is_empty()) {
                            out.push(TurnEvent::Text(text.to_string()));
                        }
                    }
                    Some("input_json_delta") => {
                        let block = self.tool_blocks.get_mut(&index).ok_or_else(|| {
                            LlmError::Malformed(format!("input delta for unknown block {}", index))
                        })?;
                        block.input_json.push_str(delta["partial_json"].as_str().unwrap_or_default());
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                let index = block_index(&data)?;
                if let Some(block) = self.tool_blocks.remove(&index) {
                    let input = if block.input_json.trim().is_empty() {
                        json!({})
                    } else {
                        serde_json::from_str(&block.input_json).map_err(|e| {
                            LlmError::Malformed(format!("tool input for {}: {}", block.name, e))
                        })?
                    };
                    out.push(TurnEvent::ToolCall(crate::ToolCall {
                        id: block.id,
                        name: block.name,
                        input,
                    }));
                }
            }
            "message_delta" => {
                if let Some(reason) = data["delta"]["stop_reason"].as_str() {
                    self.stop_reason = Some(stop_reason(reason));
                }
            }
            "message_stop" => {
                self.done = true;
                out.push(TurnEvent::Finished(
                    self.stop_reason.take().unwrap_or(StopReason::EndTurn),
                ));
            }
            "error" => {
                let message = data["error"]["message"].as_str().unwrap_or("unknown error");
                let error_type = data["error"]["type"].as_str().unwrap_or("error");
                return Err(LlmError::Api(format!("{}: {}", error_type, message)));
            }
            _ => {}
        }

        Ok(out)
    }
}

fn block_index(data: &Value) -> Result<u64, LlmError> {
    data["index"]
        .as_u64()
        .ok_or_else(|| LlmError::Malformed("content block event without index".to_string()))
}

fn stop_reason(reason: &str) -> StopReason {
    match reason {
        "end_turn" | "stop_sequence" => StopReason::EndTurn,
        "tool_use" => StopReason::ToolUse,
        "max_tokens" => StopReason::MaxTokens,
        other => StopReason::Other(other.to_string()),
    }
}

struct StreamState {
    body: BoxStream<'static, Result<Vec<u8>, LlmError>>,
    decoder: SseDecoder,
    translator: EventTranslator,
    pending: VecDeque<Result<TurnEvent, LlmError>>,
    finished: bool,
}

impl StreamState {
    fn absorb(&mut self, events: Vec<SseEvent>) {
        for event in events {
            if self.finished {
                break;
            }
            match self.translator.handle(&event) {
                Ok(turn_events) => self.pending.extend(turn_events.into_iter().map(Ok)),
                Err(e) => {
                    self.pending.push_back(Err(e));
                    self.finished = true;
                }
            }
            if self.translator.is_done() {
                self.finished = true;
            }
        }
    }
}

/// Decode a raw SSE byte stream into turn events
///
/// The stream ends after `message_stop` or the first error; a body that ends
/// before `message_stop` yields a `Malformed` error.
pub(crate) fn turn_stream(body: BoxStream<'static, Result<Vec<u8>, LlmError>>) -> TurnStream {
    let state = StreamState {
        body,
        decoder: SseDecoder::new(),
        translator: EventTranslator::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.feed(&chunk);
                    state.absorb(events);
                }
                Some(Err(e)) => {
                    state.pending.push_back(Err(e));
                    state.finished = true;
                }
                None => {
                    let trailing: Vec<SseEvent> = state.decoder.finish().into_iter().collect();
                    state.absorb(trailing);
                    if !state.finished {
                        state.pending.push_back(Err(LlmError::Malformed(
                            "stream ended before message_stop".to_string(),
                        )));
                        state.finished = true;
                    }
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ToolCall, ToolResult};
    use desk_tools::ToolDefinition;

    fn sse(events: &[(&str, Value)]) -> String {
        events
            .iter()
            .map(|(name, data)| format!("event: {}\ndata: {}\n\n", name, data))
            .collect()
    }

    fn chunked(text: String, size: usize) -> BoxStream<'static, Result<Vec<u8>, LlmError>> {
        let chunks: Vec<Result<Vec<u8>, LlmError>> =
            text.into_bytes().chunks(size).map(|c| Ok(c.to_vec())).collect();
        stream::iter(chunks).boxed()
    }

    async fn collect(stream: TurnStream) -> Vec<Result<TurnEvent, LlmError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_text_turn() {
        let body = sse(&[
            ("message_start", json!({"type": "message_start", "message": {"id": "msg_1"}})),
            ("content_block_start", json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}})),
            ("ping", json!({"type": "ping"})),
            ("content_block_delta", json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hello"}})),
            ("content_block_delta", json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": ", world"}})),
            ("content_block_stop", json!({"type": "content_block_stop", "index": 0})),
            ("message_delta", json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}})),
            ("message_stop", json!({"type": "message_stop"})),
        ]);

        let events: Vec<TurnEvent> = collect(turn_stream(chunked(body, 7)))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(
            events,
            vec![
                TurnEvent::Text("Hello".to_string()),
                TurnEvent::Text(", world".to_string()),
                TurnEvent::Finished(StopReason::EndTurn),
            ]
        );
    }

    #[tokio::test]
    async fn test_tool_use_input_reassembled() {
        let body = sse(&[
            ("content_block_start", json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "toolu_1", "name": "get_current_stock_price", "input": {}}})),
            ("content_block_delta", json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"sym"}})),
            ("content_block_delta", json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "bol\": \"ACME\"}"}})),
            ("content_block_stop", json!({"type": "content_block_stop", "index": 1})),
            ("message_delta", json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}})),
            ("message_stop", json!({"type": "message_stop"})),
        ]);

        let events: Vec<TurnEvent> = collect(turn_stream(chunked(body, 16)))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(
            events,
            vec![
                TurnEvent::ToolCall(ToolCall {
                    id: "toolu_1".to_string(),
                    name: "get_current_stock_price".to_string(),
                    input: json!({"symbol": "ACME"}),
                }),
                TurnEvent::Finished(StopReason::ToolUse),
            ]
        );
    }

    #[tokio::test]
    async fn test_error_event_ends_stream() {
        let body = sse(&[
            ("content_block_delta", json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "partial"}})),
            ("error", json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}})),
            ("content_block_delta", json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "never"}})),
        ]);

        let events = collect(turn_stream(chunked(body, 64))).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Ok(TurnEvent::Text(t)) if t == "partial"));
        assert!(matches!(&events[1], Err(LlmError::Api(m)) if m.contains("Overloaded")));
    }

    #[tokio::test]
    async fn test_truncated_stream_is_malformed() {
        let body = sse(&[(
            "content_block_delta",
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "cut"}}),
        )]);

        let events = collect(turn_stream(chunked(body, 64))).await;
        assert!(matches!(events.last(), Some(Err(LlmError::Malformed(_)))));
    }

    #[tokio::test]
    async fn test_network_error_surfaces() {
        let body: BoxStream<'static, Result<Vec<u8>, LlmError>> = stream::iter(vec![
            Ok(b"data: {\"type\":\"ping\"}\n\n".to_vec()),
            Err(LlmError::Network("connection reset".to_string())),
        ])
        .boxed();

        let events = collect(turn_stream(body)).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Err(LlmError::Network(_))));
    }

    #[test]
    fn test_request_body_shapes_messages() {
        let messages = vec![
            ChatMessage::User("price of ACME?".to_string()),
            ChatMessage::Assistant {
                text: String::new(),
                tool_calls: vec![ToolCall {
                    id: "toolu_1".to_string(),
                    name: "get_current_stock_price".to_string(),
                    input: json!({"symbol": "ACME"}),
                }],
            },
            ChatMessage::ToolResults(vec![ToolResult {
                call_id: "toolu_1".to_string(),
                content: "{\"price\": 1.0}".to_string(),
                is_error: false,
            }]),
        ];
        let tools = vec![ToolDefinition::new("get_current_stock_price", "price", json!({"type": "object"}))];
        let request = TurnRequest {
            model: "claude-sonnet-4-20250514",
            system: "You are Finance Agent.",
            messages: &messages,
            tools: &tools,
        };

        let body = request_body(&request, 1024);
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["messages"][0]["content"], "price of ACME?");
        assert_eq!(body["messages"][1]["content"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][1]["content"][0]["type"], "tool_use");
        assert_eq!(body["messages"][2]["role"], "user");
        assert_eq!(body["messages"][2]["content"][0]["tool_use_id"], "toolu_1");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn test_request_body_without_tools() {
        let messages = vec![ChatMessage::User("hi".to_string())];
        let request = TurnRequest {
            model: "m",
            system: "s",
            messages: &messages,
            tools: &[],
        };
        assert!(request_body(&request, 16).get("tools").is_none());
    }

    #[test]
    fn test_empty_api_key_rejected() {
        assert!(matches!(
            AnthropicBackend::new(AnthropicConfig::new("  ")),
            Err(LlmError::Config(_))
        ));
    }
}

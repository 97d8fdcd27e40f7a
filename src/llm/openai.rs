//! OpenAI-compatible chat completions client (Groq, OpenRouter, OpenAI, ...).

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{CompletionRequest, DeltaStream, LlmClient, StreamDelta, ToolCallDelta, TransportError};
use crate::agent::{Message, MessageContent};
use crate::tools::ToolSpec;

/// Streaming client for `POST {base_url}/chat/completions`.
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<DeltaStream, TransportError> {
        let body = request_body(&request);
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Starting streamed completion"
        );

        let builder = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body);
        let mut source =
            EventSource::new(builder).map_err(|e| TransportError::Request(e.to_string()))?;

        let stream = async_stream::stream! {
            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => {}
                    Ok(Event::Message(message)) => {
                        if message.data.trim() == "[DONE]" {
                            break;
                        }
                        match parse_chunk(&message.data) {
                            Ok(deltas) => {
                                for delta in deltas {
                                    yield Ok(delta);
                                }
                            }
                            Err(e) => {
                                yield Err(e);
                                break;
                            }
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                        let body = response.text().await.unwrap_or_default();
                        yield Err(TransportError::Status { status: status.as_u16(), body });
                        break;
                    }
                    Err(e) => {
                        yield Err(TransportError::Stream(e.to_string()));
                        break;
                    }
                }
            }
            // Stop the event source from reconnecting.
            source.close();
        };

        Ok(Box::pin(stream))
    }
}

fn request_body(request: &CompletionRequest) -> Value {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if !request.system_prompt.is_empty() {
        messages.push(json!({ "role": "system", "content": request.system_prompt }));
    }
    messages.extend(request.messages.iter().map(wire_message));

    let mut body = json!({
        "model": request.model,
        "messages": messages,
        "stream": true,
    });
    if !request.tools.is_empty() {
        body["tools"] = request.tools.iter().map(wire_tool).collect();
        body["tool_choice"] = json!("auto");
    }
    body
}

fn wire_message(message: &Message) -> Value {
    match message.content() {
        MessageContent::Text { text } => match message.role() {
            crate::agent::Role::User => json!({ "role": "user", "content": text }),
            _ => json!({ "role": "assistant", "content": text }),
        },
        MessageContent::ToolCalls { text, calls } => {
            let tool_calls: Vec<Value> = calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id(),
                        "type": "function",
                        "function": {
                            "name": call.name(),
                            "arguments": call.arguments().to_string(),
                        }
                    })
                })
                .collect();
            json!({ "role": "assistant", "content": text, "tool_calls": tool_calls })
        }
        MessageContent::ToolResult { result } => {
            let content = json!({ "status": result.status(), "payload": result.payload() });
            json!({
                "role": "tool",
                "tool_call_id": result.tool_call_id(),
                "content": content.to_string(),
            })
        }
    }
}

fn wire_tool(spec: &ToolSpec) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": spec.name,
            "description": spec.description,
            "parameters": spec.parameters,
        }
    })
}

#[derive(Debug, Deserialize)]
struct Chunk {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<WireFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct WireFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

fn parse_chunk(data: &str) -> Result<Vec<StreamDelta>, TransportError> {
    let chunk: Chunk = serde_json::from_str(data)
        .map_err(|e| TransportError::Decode(format!("{}: {}", e, data)))?;

    if let Some(error) = chunk.error {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(TransportError::Stream(message));
    }

    let mut deltas = Vec::new();
    let Some(delta) = chunk.choices.into_iter().next().and_then(|choice| choice.delta) else {
        return Ok(deltas);
    };

    if let Some(text) = delta.content.filter(|text| !text.is_empty()) {
        deltas.push(StreamDelta::Text(text));
    }
    for call in delta.tool_calls.unwrap_or_default() {
        let (name, arguments) = match call.function {
            Some(function) => (function.name, function.arguments.unwrap_or_default()),
            None => (None, String::new()),
        };
        deltas.push(StreamDelta::ToolCall(ToolCallDelta {
            index: call.index,
            id: call.id,
            name,
            arguments,
        }));
    }
    Ok(deltas)
}

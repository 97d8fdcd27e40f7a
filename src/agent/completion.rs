//! Completion driver: one streamed model response in, one typed outcome out.
//!
//! Text deltas are forwarded to the UI as they arrive. Tool-call fragments are
//! buffered per index and only turned into [`ToolCall`]s once the stream has
//! ended, so a half-received call is never visible to the loop.

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::events::{AgentEvent, AgentUi};
use super::message::{Message, ToolCall};
use crate::llm::{CompletionRequest, LlmClient, StreamDelta, ToolCallDelta, TransportError};
use crate::tools::ToolSpec;

/// What to do with free text that arrives alongside tool calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolCallTextPolicy {
    /// Keep the text in the assistant message that carries the calls.
    #[default]
    Retain,
    /// Drop it from history; the user still saw it streamed.
    Discard,
}

impl FromStr for ToolCallTextPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "retain" => Ok(Self::Retain),
            "discard" => Ok(Self::Discard),
            other => Err(format!("expected 'retain' or 'discard', got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    FinalText(String),
    ToolCallsRequested {
        calls: Vec<ToolCall>,
        text: Option<String>,
    },
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Malformed model response: {0}")]
    Malformed(String),

    #[error("Completion cancelled")]
    Cancelled,
}

#[derive(Debug, Default)]
struct PendingCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

impl PendingCall {
    fn absorb(&mut self, delta: ToolCallDelta) {
        if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
            self.id.get_or_insert(id);
        }
        // Some servers repeat the name in every fragment; the first one wins.
        if let Some(name) = delta.name.filter(|name| !name.is_empty()) {
            if self.name.is_empty() {
                self.name = name;
            }
        }
        self.arguments.push_str(&delta.arguments);
    }

    fn finish(self, index: usize) -> Result<ToolCall, CompletionError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(CompletionError::Malformed(format!(
                "tool call #{} has no name",
                index
            )));
        }

        let arguments = if self.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str::<Value>(&self.arguments).map_err(|e| {
                CompletionError::Malformed(format!(
                    "arguments for tool '{}' are not valid JSON: {}",
                    name, e
                ))
            })?
        };
        if !arguments.is_object() {
            return Err(CompletionError::Malformed(format!(
                "arguments for tool '{}' must be a JSON object",
                name
            )));
        }

        let id = self
            .id
            .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple()));
        Ok(ToolCall::new(id, name, arguments))
    }
}

pub struct CompletionDriver {
    client: Arc<dyn LlmClient>,
    model: String,
    system_prompt: String,
    text_policy: ToolCallTextPolicy,
}

impl CompletionDriver {
    pub fn new(
        client: Arc<dyn LlmClient>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        text_policy: ToolCallTextPolicy,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            system_prompt: system_prompt.into(),
            text_policy,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one completion over `history` and interpret the response.
    pub async fn complete(
        &self,
        history: Vec<Message>,
        tools: Vec<ToolSpec>,
        ui: &dyn AgentUi,
        cancel: &CancellationToken,
    ) -> Result<CompletionOutcome, CompletionError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
            messages: history,
            tools,
        };

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CompletionError::Cancelled),
            stream = self.client.stream_completion(request) => stream?,
        };

        let mut text = String::new();
        let mut pending: BTreeMap<usize, PendingCall> = BTreeMap::new();

        loop {
            let delta = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("Completion stream abandoned on cancellation");
                    return Err(CompletionError::Cancelled);
                }
                delta = stream.next() => delta,
            };

            match delta {
                None => break,
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(StreamDelta::Text(chunk))) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    text.push_str(&chunk);
                    ui.emit(AgentEvent::TextDelta { content: chunk });
                }
                Some(Ok(StreamDelta::ToolCall(fragment))) => {
                    pending.entry(fragment.index).or_default().absorb(fragment);
                }
            }
        }

        self.interpret(text, pending)
    }

    fn interpret(
        &self,
        text: String,
        pending: BTreeMap<usize, PendingCall>,
    ) -> Result<CompletionOutcome, CompletionError> {
        if pending.is_empty() {
            if text.trim().is_empty() {
                return Err(CompletionError::Malformed(
                    "response contained neither text nor tool calls".to_string(),
                ));
            }
            return Ok(CompletionOutcome::FinalText(text));
        }

        let mut calls = Vec::with_capacity(pending.len());
        let mut seen = HashSet::new();
        for (index, call) in pending {
            let call = call.finish(index)?;
            if !seen.insert(call.id().to_string()) {
                return Err(CompletionError::Malformed(format!(
                    "duplicate tool call id '{}'",
                    call.id()
                )));
            }
            calls.push(call);
        }

        let text = match self.text_policy {
            ToolCallTextPolicy::Retain if !text.trim().is_empty() => Some(text),
            _ => None,
        };
        tracing::debug!(
            calls = calls.len(),
            with_text = text.is_some(),
            "Model requested tool calls"
        );
        Ok(CompletionOutcome::ToolCallsRequested { calls, text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::{text, tool_call, RecordingUi, Script, ScriptedLlm};
    use serde_json::json;

    fn driver(llm: ScriptedLlm, policy: ToolCallTextPolicy) -> (CompletionDriver, Arc<ScriptedLlm>) {
        let llm = Arc::new(llm);
        (
            CompletionDriver::new(llm.clone(), "test-model", "system", policy),
            llm,
        )
    }

    async fn run(driver: &CompletionDriver, ui: &RecordingUi) -> Result<CompletionOutcome, CompletionError> {
        driver
            .complete(
                vec![Message::user("hi")],
                Vec::new(),
                ui,
                &CancellationToken::new(),
            )
            .await
    }

    #[tokio::test]
    async fn streams_text_and_returns_final_text() {
        let (driver, llm) = driver(
            ScriptedLlm::new(vec![Script::Respond(text(&["Hel", "lo"]))]),
            ToolCallTextPolicy::Retain,
        );
        let ui = RecordingUi::holding_approvals();

        let outcome = run(&driver, &ui).await.expect("completion");

        assert_eq!(outcome, CompletionOutcome::FinalText("Hello".to_string()));
        assert_eq!(
            ui.events(),
            vec![
                AgentEvent::TextDelta { content: "Hel".into() },
                AgentEvent::TextDelta { content: "lo".into() },
            ]
        );
        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].system_prompt, "system");
        assert_eq!(requests[0].model, "test-model");
    }

    #[tokio::test]
    async fn assembles_fragmented_tool_calls_in_index_order() {
        let deltas = vec![
            tool_call(1, Some("b"), Some("read_file"), "{\"path\":"),
            tool_call(0, Some("a"), Some("list_dir"), ""),
            tool_call(1, None, None, "\"x.txt\"}"),
            tool_call(0, None, None, "{\"path\": \".\"}"),
        ];
        let (driver, _) = driver(
            ScriptedLlm::new(vec![Script::Respond(deltas)]),
            ToolCallTextPolicy::Retain,
        );
        let ui = RecordingUi::holding_approvals();

        let outcome = run(&driver, &ui).await.expect("completion");

        assert_eq!(
            outcome,
            CompletionOutcome::ToolCallsRequested {
                calls: vec![
                    ToolCall::new("a", "list_dir", json!({ "path": "." })),
                    ToolCall::new("b", "read_file", json!({ "path": "x.txt" })),
                ],
                text: None,
            }
        );
    }

    #[tokio::test]
    async fn repeated_name_fragments_keep_a_single_name() {
        let deltas = vec![
            tool_call(0, Some("a"), Some("list_dir"), "{\"path\":"),
            tool_call(0, Some("a"), Some("list_dir"), "\".\"}"),
        ];
        let (driver, _) = driver(
            ScriptedLlm::new(vec![Script::Respond(deltas)]),
            ToolCallTextPolicy::Retain,
        );
        let ui = RecordingUi::holding_approvals();

        let outcome = run(&driver, &ui).await.expect("completion");

        assert_eq!(
            outcome,
            CompletionOutcome::ToolCallsRequested {
                calls: vec![ToolCall::new("a", "list_dir", json!({ "path": "." }))],
                text: None,
            }
        );
    }

    #[tokio::test]
    async fn empty_arguments_become_empty_object_and_missing_id_is_synthesized() {
        let (driver, _) = driver(
            ScriptedLlm::new(vec![Script::Respond(vec![tool_call(0, None, Some("list_dir"), "")])]),
            ToolCallTextPolicy::Retain,
        );
        let ui = RecordingUi::holding_approvals();

        let outcome = run(&driver, &ui).await.expect("completion");
        let CompletionOutcome::ToolCallsRequested { calls, .. } = outcome else {
            panic!("expected tool calls");
        };
        assert_eq!(calls[0].arguments(), &json!({}));
        assert!(calls[0].id().starts_with("call_"));
    }

    #[tokio::test]
    async fn text_policy_decides_whether_accompanying_text_is_kept() {
        let mut deltas = text(&["Let me look."]);
        deltas.push(tool_call(0, Some("a"), Some("list_dir"), "{}"));

        for (policy, expected) in [
            (ToolCallTextPolicy::Retain, Some("Let me look.".to_string())),
            (ToolCallTextPolicy::Discard, None),
        ] {
            let (driver, _) = driver(
                ScriptedLlm::new(vec![Script::Respond(deltas.clone())]),
                policy,
            );
            let ui = RecordingUi::holding_approvals();

            let outcome = run(&driver, &ui).await.expect("completion");
            let CompletionOutcome::ToolCallsRequested { text, .. } = outcome else {
                panic!("expected tool calls");
            };
            assert_eq!(text, expected);
            // Streamed either way.
            assert_eq!(ui.events().len(), 1);
        }
    }

    #[tokio::test]
    async fn malformed_tool_calls_are_rejected() {
        let cases = vec![
            vec![tool_call(0, Some("a"), Some("list_dir"), "{\"path\": ")],
            vec![tool_call(0, Some("a"), Some("list_dir"), "[1, 2]")],
            vec![tool_call(0, Some("a"), None, "{}")],
            vec![
                tool_call(0, Some("a"), Some("list_dir"), "{}"),
                tool_call(1, Some("a"), Some("read_file"), "{}"),
            ],
            Vec::new(),
        ];

        for deltas in cases {
            let (driver, _) = driver(
                ScriptedLlm::new(vec![Script::Respond(deltas)]),
                ToolCallTextPolicy::Retain,
            );
            let ui = RecordingUi::holding_approvals();
            let err = run(&driver, &ui).await.expect_err("malformed");
            assert!(matches!(err, CompletionError::Malformed(_)), "got {:?}", err);
        }
    }

    #[tokio::test]
    async fn transport_errors_propagate() {
        let (driver, _) = driver(
            ScriptedLlm::new(vec![Script::Fail("connection refused".into())]),
            ToolCallTextPolicy::Retain,
        );
        let ui = RecordingUi::holding_approvals();

        let err = run(&driver, &ui).await.expect_err("transport failure");
        assert!(matches!(err, CompletionError::Transport(TransportError::Request(_))));
    }

    #[tokio::test]
    async fn mid_stream_errors_propagate_after_partial_text() {
        let (driver, _) = driver(
            ScriptedLlm::new(vec![Script::FailMidStream(text(&["par"]), "reset".into())]),
            ToolCallTextPolicy::Retain,
        );
        let ui = RecordingUi::holding_approvals();

        let err = run(&driver, &ui).await.expect_err("stream failure");
        assert!(matches!(err, CompletionError::Transport(TransportError::Stream(_))));
        assert_eq!(ui.events().len(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_a_hanging_stream() {
        let (driver, _) = driver(
            ScriptedLlm::new(vec![Script::Hang]),
            ToolCallTextPolicy::Retain,
        );
        let ui = RecordingUi::holding_approvals();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = driver
            .complete(vec![Message::user("hi")], Vec::new(), &ui, &cancel)
            .await
            .expect_err("cancelled");
        assert!(matches!(err, CompletionError::Cancelled));
    }

    #[test]
    fn text_policy_parses_case_insensitively() {
        assert_eq!("Retain".parse::<ToolCallTextPolicy>(), Ok(ToolCallTextPolicy::Retain));
        assert_eq!(" discard ".parse::<ToolCallTextPolicy>(), Ok(ToolCallTextPolicy::Discard));
        assert!("defer".parse::<ToolCallTextPolicy>().is_err());
    }
}

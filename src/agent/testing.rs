//! Test doubles for the agent: a scripted model, a recording UI and a few
//! misbehaving tools.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::approval::{ApprovalDecision, ApprovalReply, ApprovalRequest};
use super::events::{AgentEvent, AgentUi};
use crate::llm::{
    CompletionRequest, DeltaStream, LlmClient, StreamDelta, ToolCallDelta, TransportError,
};
use crate::tools::{SideEffectClass, Tool};

pub(crate) fn text(chunks: &[&str]) -> Vec<StreamDelta> {
    chunks
        .iter()
        .map(|chunk| StreamDelta::Text(chunk.to_string()))
        .collect()
}

pub(crate) fn tool_call(
    index: usize,
    id: Option<&str>,
    name: Option<&str>,
    arguments: &str,
) -> StreamDelta {
    StreamDelta::ToolCall(ToolCallDelta {
        index,
        id: id.map(str::to_string),
        name: name.map(str::to_string),
        arguments: arguments.to_string(),
    })
}

/// One canned model response.
#[derive(Debug, Clone)]
pub(crate) enum Script {
    Respond(Vec<StreamDelta>),
    /// The request itself fails.
    Fail(String),
    /// Some deltas arrive, then the stream breaks.
    FailMidStream(Vec<StreamDelta>, String),
    /// The stream never yields.
    Hang,
}

pub(crate) struct ScriptedLlm {
    scripts: Mutex<VecDeque<Script>>,
    repeat: Option<Script>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub(crate) fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every request with the same script.
    pub(crate) fn repeating(script: Script) -> Self {
        Self {
            repeat: Some(script),
            ..Self::new(Vec::new())
        }
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<DeltaStream, TransportError> {
        self.requests.lock().expect("requests lock").push(request);
        let script = self
            .scripts
            .lock()
            .expect("scripts lock")
            .pop_front()
            .or_else(|| self.repeat.clone())
            .ok_or_else(|| TransportError::Request("script exhausted".to_string()))?;

        match script {
            Script::Respond(deltas) => Ok(Box::pin(stream::iter(
                deltas.into_iter().map(Ok::<_, TransportError>),
            ))),
            Script::Fail(message) => Err(TransportError::Request(message)),
            Script::FailMidStream(deltas, message) => {
                let items = deltas
                    .into_iter()
                    .map(Ok::<_, TransportError>)
                    .chain(std::iter::once(Err(TransportError::Stream(message))));
                Ok(Box::pin(stream::iter(items)))
            }
            Script::Hang => Ok(Box::pin(stream::pending::<Result<StreamDelta, TransportError>>())),
        }
    }
}

enum ApprovalBehavior {
    /// Keep the reply handle until the test answers.
    Hold,
    Decide(ApprovalDecision),
    DropReply,
    /// Cancel the turn as soon as an approval is requested.
    CancelTurn(CancellationToken),
}

pub(crate) struct RecordingUi {
    behavior: ApprovalBehavior,
    events: Mutex<Vec<AgentEvent>>,
    requests: Mutex<Vec<ApprovalRequest>>,
    held: Mutex<HashMap<String, ApprovalReply>>,
    inputs: tokio::sync::Mutex<VecDeque<String>>,
}

impl RecordingUi {
    fn with_behavior(behavior: ApprovalBehavior) -> Self {
        Self {
            behavior,
            events: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            held: Mutex::new(HashMap::new()),
            inputs: tokio::sync::Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn holding_approvals() -> Self {
        Self::with_behavior(ApprovalBehavior::Hold)
    }

    pub(crate) fn deciding(decision: ApprovalDecision) -> Self {
        Self::with_behavior(ApprovalBehavior::Decide(decision))
    }

    pub(crate) fn dropping_approvals() -> Self {
        Self::with_behavior(ApprovalBehavior::DropReply)
    }

    pub(crate) fn cancelling_on_approval(cancel: CancellationToken) -> Self {
        Self::with_behavior(ApprovalBehavior::CancelTurn(cancel))
    }

    pub(crate) fn with_inputs(self, inputs: &[&str]) -> Self {
        Self {
            inputs: tokio::sync::Mutex::new(inputs.iter().map(|s| s.to_string()).collect()),
            ..self
        }
    }

    pub(crate) fn events(&self) -> Vec<AgentEvent> {
        self.events.lock().expect("events lock").clone()
    }

    pub(crate) fn approval_requests(&self) -> Vec<ApprovalRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// Answer a held approval. Returns false if nothing was held for `id`.
    pub(crate) fn answer(&self, id: &str, decision: ApprovalDecision) -> bool {
        match self.held.lock().expect("held lock").remove(id) {
            Some(reply) => reply.send(decision).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl AgentUi for RecordingUi {
    fn emit(&self, event: AgentEvent) {
        self.events.lock().expect("events lock").push(event);
    }

    fn request_approval(&self, request: ApprovalRequest, reply: ApprovalReply) {
        let id = request.tool_call_id.clone();
        self.requests.lock().expect("requests lock").push(request);
        match &self.behavior {
            ApprovalBehavior::Hold => {
                self.held.lock().expect("held lock").insert(id, reply);
            }
            ApprovalBehavior::Decide(decision) => {
                let _ = reply.send(*decision);
            }
            ApprovalBehavior::DropReply => drop(reply),
            ApprovalBehavior::CancelTurn(cancel) => {
                self.held.lock().expect("held lock").insert(id, reply);
                cancel.cancel();
            }
        }
    }

    async fn next_input(&self) -> Option<String> {
        self.inputs.lock().await.pop_front()
    }
}

/// Counts its invocations and reports the count as payload.
pub(crate) struct CountingTool {
    name: &'static str,
    class: SideEffectClass,
    calls: AtomicUsize,
}

impl CountingTool {
    pub(crate) fn read_only(name: &'static str) -> Self {
        Self {
            name,
            class: SideEffectClass::ReadOnly,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn mutating(name: &'static str) -> Self {
        Self {
            class: SideEffectClass::Mutating,
            ..Self::read_only(name)
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for CountingTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Counts how often it runs"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" }
            }
        })
    }

    fn side_effect_class(&self) -> SideEffectClass {
        self.class
    }

    async fn execute(&self, _args: Value, _workspace: &Path) -> anyhow::Result<Value> {
        let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(json!({ "calls": calls }))
    }
}

pub(crate) struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "fail"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn side_effect_class(&self) -> SideEffectClass {
        SideEffectClass::ReadOnly
    }

    async fn execute(&self, _args: Value, _workspace: &Path) -> anyhow::Result<Value> {
        anyhow::bail!("disk on fire")
    }
}

pub(crate) struct PanickingTool;

#[async_trait]
impl Tool for PanickingTool {
    fn name(&self) -> &str {
        "panic"
    }

    fn description(&self) -> &str {
        "Panics"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn side_effect_class(&self) -> SideEffectClass {
        SideEffectClass::ReadOnly
    }

    async fn execute(&self, _args: Value, _workspace: &Path) -> anyhow::Result<Value> {
        panic!("handler bug")
    }
}

pub(crate) struct SleepingTool {
    duration: Duration,
}

impl SleepingTool {
    pub(crate) fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl Tool for SleepingTool {
    fn name(&self) -> &str {
        "sleep"
    }

    fn description(&self) -> &str {
        "Sleeps before answering"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn side_effect_class(&self) -> SideEffectClass {
        SideEffectClass::ReadOnly
    }

    async fn execute(&self, _args: Value, _workspace: &Path) -> anyhow::Result<Value> {
        tokio::time::sleep(self.duration).await;
        Ok(json!({ "slept_ms": self.duration.as_millis() as u64 }))
    }
}

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::approval::{ApprovalReply, ApprovalRequest};
use super::message::ToolStatus;
use crate::tools::SideEffectClass;

/// Frontend-agnostic agent events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Text content being streamed.
    TextDelta { content: String },
    /// Agent is calling a tool.
    ToolCall {
        id: String,
        name: String,
        args: Value,
        side_effect_class: SideEffectClass,
    },
    /// Tool call resolved (executed, denied, failed or timed out).
    ToolResult {
        id: String,
        name: String,
        status: ToolStatus,
        payload: Value,
    },
    /// Final answer of the turn.
    FinalText { content: String },
    /// The turn hit the round limit.
    RoundLimitReached { rounds: u32, message: String },
    /// Error occurred.
    Error { message: String },
    /// The turn was cancelled by the user.
    TurnCancelled,
}

/// The console, or whatever else sits between the user and the agent.
///
/// `emit` and `request_approval` must not block: approvals are answered later
/// through the reply channel, which the agent awaits alongside cancellation.
#[async_trait]
pub trait AgentUi: Send + Sync {
    fn emit(&self, event: AgentEvent);

    /// Present an approval prompt. Dropping `reply` counts as a denial.
    fn request_approval(&self, request: ApprovalRequest, reply: ApprovalReply);

    /// Next line of user input, or `None` once input is closed.
    async fn next_input(&self) -> Option<String>;
}

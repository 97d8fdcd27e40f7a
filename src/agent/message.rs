//! Conversation data model and the append-only message store.
//!
//! The order of messages in the store is exactly what the model has seen.
//! Tool calls issued by an assistant message must each be answered by one
//! tool result, in request order, before the conversation moves on.

use std::collections::{HashSet, VecDeque};
use std::fmt;

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// A tool invocation requested by the model.
///
/// Built by the completion driver once a response is fully received; never
/// modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
    id: String,
    name: String,
    arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &Value {
        &self.arguments
    }
}

/// Outcome class of a resolved tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Ok,
    Error,
    Denied,
    Timeout,
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Error => write!(f, "error"),
            Self::Denied => write!(f, "denied"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Result of one tool call, as shown to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    tool_call_id: String,
    tool_name: String,
    status: ToolStatus,
    payload: Value,
}

impl ToolResult {
    pub fn ok(call: &ToolCall, payload: Value) -> Self {
        Self::with_status(call, ToolStatus::Ok, payload)
    }

    pub fn error(call: &ToolCall, message: impl fmt::Display) -> Self {
        Self::with_status(call, ToolStatus::Error, json!({ "error": message.to_string() }))
    }

    pub fn denied(call: &ToolCall, message: impl fmt::Display) -> Self {
        Self::with_status(call, ToolStatus::Denied, json!({ "error": message.to_string() }))
    }

    pub fn timeout(call: &ToolCall, message: impl fmt::Display) -> Self {
        Self::with_status(call, ToolStatus::Timeout, json!({ "error": message.to_string() }))
    }

    fn with_status(call: &ToolCall, status: ToolStatus, payload: Value) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            status,
            payload,
        }
    }

    pub fn tool_call_id(&self) -> &str {
        &self.tool_call_id
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn status(&self) -> ToolStatus {
        self.status
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    ToolResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: String },
    ToolCalls { text: Option<String>, calls: Vec<ToolCall> },
    ToolResult { result: ToolResult },
}

/// One conversation turn entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    role: Role,
    content: MessageContent,
    tool_call_id: Option<String>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text { text: text.into() },
            tool_call_id: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text { text: text.into() },
            tool_call_id: None,
        }
    }

    pub fn tool_calls(text: Option<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::ToolCalls { text, calls },
            tool_call_id: None,
        }
    }

    pub fn tool_result(result: ToolResult) -> Self {
        Self {
            role: Role::ToolResult,
            tool_call_id: Some(result.tool_call_id.clone()),
            content: MessageContent::ToolResult { result },
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &MessageContent {
        &self.content
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        self.tool_call_id.as_deref()
    }

    /// Plain text of a user or assistant message, if any.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text { text } => Some(text),
            MessageContent::ToolCalls { text, .. } => text.as_deref(),
            MessageContent::ToolResult { .. } => None,
        }
    }
}

/// Violation of the message store's ordering contract.
///
/// Only the agent loop appends, so this always indicates a bug in the core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid message: {reason}")]
pub struct InvalidMessage {
    reason: String,
}

impl InvalidMessage {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Ordered, append-only conversation history.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
    /// Call ids awaiting a result, in request order.
    outstanding: VecDeque<String>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, enforcing the tool call / result pairing.
    pub fn append(&mut self, message: Message) -> Result<(), InvalidMessage> {
        match &message.content {
            MessageContent::ToolResult { result } => {
                match self.outstanding.front() {
                    Some(expected) if *expected == result.tool_call_id => {}
                    Some(expected) => {
                        let reason = if self.outstanding.contains(&result.tool_call_id) {
                            format!(
                                "tool result for '{}' arrived before the result for '{}'",
                                result.tool_call_id, expected
                            )
                        } else {
                            format!(
                                "tool result references unknown call '{}'",
                                result.tool_call_id
                            )
                        };
                        return Err(InvalidMessage::new(reason));
                    }
                    None => {
                        return Err(InvalidMessage::new(format!(
                            "tool result references '{}' but no tool call is outstanding",
                            result.tool_call_id
                        )))
                    }
                }
                self.outstanding.pop_front();
            }
            MessageContent::ToolCalls { calls, .. } => {
                self.ensure_no_outstanding(message.role)?;
                if calls.is_empty() {
                    return Err(InvalidMessage::new("tool call message carries no calls"));
                }
                let mut seen = HashSet::new();
                for call in calls {
                    if !seen.insert(call.id.as_str()) {
                        return Err(InvalidMessage::new(format!(
                            "duplicate tool call id '{}'",
                            call.id
                        )));
                    }
                }
                self.outstanding
                    .extend(calls.iter().map(|call| call.id.clone()));
            }
            MessageContent::Text { .. } => self.ensure_no_outstanding(message.role)?,
        }

        self.messages.push(message);
        Ok(())
    }

    /// Copy of the history as it stands now.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Ids of tool calls that still await a result.
    pub fn outstanding_calls(&self) -> Vec<String> {
        self.outstanding.iter().cloned().collect()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn ensure_no_outstanding(&self, role: Role) -> Result<(), InvalidMessage> {
        match self.outstanding.front() {
            Some(id) => Err(InvalidMessage::new(format!(
                "{:?} message appended while tool call '{}' is unanswered",
                role, id
            ))),
            None => Ok(()),
        }
    }
}

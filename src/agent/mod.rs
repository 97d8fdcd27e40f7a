//! Agent module - the conversation orchestration core.
//!
//! The agent follows a "tools in a loop" pattern:
//! 1. Append the user's message to the session history
//! 2. Ask the model for a completion with the registered tools
//! 3. If the model requests tool calls, pass each through the approval gate,
//!    execute the approved ones and append every result in request order
//! 4. Repeat until the model answers in plain text, the round limit is hit or
//!    the user cancels the turn

mod agent_loop;
mod approval;
mod completion;
mod events;
mod executor;
mod message;
mod prompt;
mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use agent_loop::{Agent, AgentError, TurnOutcome};
pub use approval::{
    ApprovalDecision, ApprovalGate, ApprovalMode, ApprovalReply, ApprovalRequest, DenialReason,
    Verdict,
};
pub use completion::{CompletionDriver, CompletionError, CompletionOutcome, ToolCallTextPolicy};
pub use events::{AgentEvent, AgentUi};
pub use executor::ToolExecutor;
pub use message::{
    InvalidMessage, Message, MessageContent, MessageStore, Role, ToolCall, ToolResult, ToolStatus,
};
pub use prompt::build_system_prompt;
pub use session::{LoopState, Session, TurnCanceller};

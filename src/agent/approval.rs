//! Approval gate: decides whether a requested tool call may run.
//!
//! Read-only tools and auto-approve sessions pass straight through. Anything
//! else stays pending, as a suspended `review` future, until the UI answers on
//! a one-shot channel or the turn is cancelled. Decisions are per call id and never reused.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::events::AgentUi;
use super::message::ToolCall;
use crate::tools::SideEffectClass;

/// Session-wide approval setting, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalMode {
    Interactive,
    AutoApprove,
}

/// What the UI is asked to approve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApprovalRequest {
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments: Value,
    pub side_effect_class: SideEffectClass,
}

/// Answer from the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    Deny,
}

/// Reply handle handed to the UI with each approval request.
pub type ApprovalReply = oneshot::Sender<ApprovalDecision>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// The user said no.
    User,
    /// The turn was cancelled while the call was pending.
    Cancelled,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "Tool call denied by the user"),
            Self::Cancelled => write!(f, "Tool call cancelled before approval"),
        }
    }
}

/// Terminal state of a call that went through the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    Denied(DenialReason),
}

pub struct ApprovalGate {
    mode: ApprovalMode,
}

impl ApprovalGate {
    pub fn new(mode: ApprovalMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ApprovalMode {
        self.mode
    }

    /// Run one call through the gate.
    ///
    /// Suspends until the UI decides when the call needs approval. If `cancel`
    /// fires first the call is denied as cancelled.
    pub async fn review(
        &self,
        call: &ToolCall,
        side_effect_class: SideEffectClass,
        ui: &dyn AgentUi,
        cancel: &CancellationToken,
    ) -> Verdict {
        if self.mode == ApprovalMode::AutoApprove || side_effect_class == SideEffectClass::ReadOnly
        {
            tracing::debug!(
                tool = %call.name(),
                id = %call.id(),
                class = %side_effect_class,
                "Tool call approved without prompting"
            );
            return Verdict::Approved;
        }

        if cancel.is_cancelled() {
            return self.log_verdict(call, Verdict::Denied(DenialReason::Cancelled));
        }

        let request = ApprovalRequest {
            tool_call_id: call.id().to_string(),
            tool_name: call.name().to_string(),
            arguments: call.arguments().clone(),
            side_effect_class,
        };
        let (tx, rx) = oneshot::channel();

        tracing::debug!(tool = %call.name(), id = %call.id(), "Waiting for tool approval");
        ui.request_approval(request, tx);

        let verdict = tokio::select! {
            biased;
            _ = cancel.cancelled() => Verdict::Denied(DenialReason::Cancelled),
            decision = rx => match decision {
                Ok(ApprovalDecision::Approve) => Verdict::Approved,
                Ok(ApprovalDecision::Deny) => Verdict::Denied(DenialReason::User),
                // The UI dropped the reply handle without answering.
                Err(_) => Verdict::Denied(DenialReason::Cancelled),
            },
        };

        self.log_verdict(call, verdict)
    }

    fn log_verdict(&self, call: &ToolCall, verdict: Verdict) -> Verdict {
        match verdict {
            Verdict::Approved => {
                tracing::info!(tool = %call.name(), id = %call.id(), "Tool call approved")
            }
            Verdict::Denied(reason) => tracing::info!(
                tool = %call.name(),
                id = %call.id(),
                reason = ?reason,
                "Tool call denied"
            ),
        }
        verdict
    }
}

//! Core agent loop implementation.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::llm::LlmClient;
use crate::tools::ToolRegistry;

use super::approval::{DenialReason, Verdict};
use super::completion::{CompletionDriver, CompletionError, CompletionOutcome};
use super::events::{AgentEvent, AgentUi};
use super::executor::ToolExecutor;
use super::message::{InvalidMessage, Message, ToolCall, ToolResult};
use super::prompt::build_system_prompt;
use super::session::{LoopState, Session, TurnCanceller};

/// Fatal agent failures. Everything the model or a tool does wrong is fed
/// back into the conversation instead.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    InvalidMessage(#[from] InvalidMessage),
}

/// How a user turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model produced a final answer.
    Answered(String),
    /// The turn ran out of rounds; carries the synthesized explanation.
    RoundLimitReached(String),
    Cancelled,
    /// The provider could not be reached; the turn was abandoned.
    TransportFailed(String),
}

/// The conversational agent.
pub struct Agent {
    driver: CompletionDriver,
    registry: Arc<ToolRegistry>,
    executor: ToolExecutor,
    ui: Arc<dyn AgentUi>,
    config: Config,
}

impl Agent {
    /// Create an agent using `client` for completions and `registry` for tools.
    pub fn new(
        config: Config,
        client: Arc<dyn LlmClient>,
        registry: Arc<ToolRegistry>,
        ui: Arc<dyn AgentUi>,
    ) -> Self {
        let system_prompt = build_system_prompt(registry.workspace(), &registry.specs());
        let driver = CompletionDriver::new(
            client,
            config.default_model.clone(),
            system_prompt,
            config.tool_call_text,
        );
        let executor = ToolExecutor::new(Arc::clone(&registry), config.tool_timeout);

        Self {
            driver,
            registry,
            executor,
            ui,
            config,
        }
    }

    /// Read user input until the exit command or end of input.
    ///
    /// Each turn gets a fresh cancellation token from `canceller`.
    pub async fn run(
        &self,
        session: &mut Session,
        canceller: &TurnCanceller,
    ) -> Result<(), AgentError> {
        tracing::info!(session = %session.id(), mode = ?session.mode(), "Session started");

        loop {
            let Some(input) = self.ui.next_input().await else {
                tracing::info!(session = %session.id(), "Input closed, ending session");
                return Ok(());
            };
            if self.config.is_exit_command(&input) {
                tracing::info!(session = %session.id(), "Exit command received");
                return Ok(());
            }
            if input.trim().is_empty() {
                continue;
            }

            let cancel = canceller.start_turn();
            let outcome = self.run_turn(session, &input, &cancel).await;
            canceller.finish_turn();

            match outcome {
                Ok(outcome) => tracing::debug!(session = %session.id(), ?outcome, "Turn finished"),
                Err(e) => {
                    tracing::error!(session = %session.id(), error = %e, "Session history is inconsistent");
                    return Err(e);
                }
            }
        }
    }

    /// Run one user request to completion, cancellation or failure.
    pub async fn run_turn(
        &self,
        session: &mut Session,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, AgentError> {
        session.reset_rounds();
        session.store_mut().append(Message::user(input))?;
        let tools = self.registry.specs();

        loop {
            if session.rounds() >= self.config.max_rounds {
                return self.stop_at_round_limit(session);
            }

            session.transition(LoopState::Completing);
            let round = session.start_round();
            tracing::debug!(session = %session.id(), round, model = %self.driver.model(), "Requesting completion");

            let completion = self
                .driver
                .complete(session.store().snapshot(), tools.clone(), self.ui.as_ref(), cancel)
                .await;

            match completion {
                Ok(CompletionOutcome::FinalText(text)) => {
                    session.store_mut().append(Message::assistant(text.clone()))?;
                    self.ui.emit(AgentEvent::FinalText {
                        content: text.clone(),
                    });
                    self.finish(session);
                    return Ok(TurnOutcome::Answered(text));
                }
                Ok(CompletionOutcome::ToolCallsRequested { calls, text }) => {
                    session
                        .store_mut()
                        .append(Message::tool_calls(text, calls.clone()))?;
                    session.transition(LoopState::ToolPhase);
                    self.run_tool_phase(session, &calls, cancel).await?;

                    if cancel.is_cancelled() {
                        return Ok(self.cancelled(session));
                    }
                }
                Err(CompletionError::Malformed(reason)) => {
                    tracing::warn!(session = %session.id(), round, %reason, "Malformed model response");
                    self.ui.emit(AgentEvent::Error {
                        message: format!("Model response was malformed ({}); asking it to retry", reason),
                    });
                    session.store_mut().append(Message::user(format!(
                        "Your previous response could not be parsed: {}. Please try again, \
                         making sure any tool call has a name and a JSON object as arguments.",
                        reason
                    )))?;
                }
                Err(CompletionError::Cancelled) => return Ok(self.cancelled(session)),
                Err(CompletionError::Transport(e)) => {
                    tracing::error!(session = %session.id(), round, error = %e, "Completion transport failed");
                    let message = e.to_string();
                    self.ui.emit(AgentEvent::Error {
                        message: message.clone(),
                    });
                    session.transition(LoopState::AwaitingInput);
                    return Ok(TurnOutcome::TransportFailed(message));
                }
            }
        }
    }

    /// Resolve every call of a batch, in order, appending one result each.
    ///
    /// Once `cancel` fires, the remaining calls are denied without running.
    async fn run_tool_phase(
        &self,
        session: &mut Session,
        calls: &[ToolCall],
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        for call in calls {
            let result = if cancel.is_cancelled() {
                ToolResult::denied(call, DenialReason::Cancelled)
            } else {
                self.resolve_call(session, call, cancel).await
            };

            self.ui.emit(AgentEvent::ToolResult {
                id: result.tool_call_id().to_string(),
                name: result.tool_name().to_string(),
                status: result.status(),
                payload: result.payload().clone(),
            });
            session.store_mut().append(Message::tool_result(result))?;
        }
        Ok(())
    }

    async fn resolve_call(
        &self,
        session: &Session,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> ToolResult {
        let side_effect_class = match self.registry.validate(call.name(), call.arguments()) {
            Ok(spec) => spec.side_effect_class,
            Err(e) => {
                tracing::warn!(tool = %call.name(), id = %call.id(), error = %e, "Rejected tool call");
                return ToolResult::error(call, e);
            }
        };

        self.ui.emit(AgentEvent::ToolCall {
            id: call.id().to_string(),
            name: call.name().to_string(),
            args: call.arguments().clone(),
            side_effect_class,
        });

        match session
            .gate()
            .review(call, side_effect_class, self.ui.as_ref(), cancel)
            .await
        {
            Verdict::Approved => self.executor.execute(call, cancel).await,
            Verdict::Denied(reason) => ToolResult::denied(call, reason),
        }
    }

    fn stop_at_round_limit(&self, session: &mut Session) -> Result<TurnOutcome, AgentError> {
        let rounds = session.rounds();
        tracing::warn!(session = %session.id(), rounds, "Round limit reached");

        let message = format!(
            "I stopped after {} rounds of tool use without reaching a final answer. \
             Ask me to continue if you want me to keep going.",
            rounds
        );
        session.store_mut().append(Message::assistant(message.clone()))?;
        self.ui.emit(AgentEvent::RoundLimitReached {
            rounds,
            message: message.clone(),
        });
        self.finish(session);
        Ok(TurnOutcome::RoundLimitReached(message))
    }

    fn cancelled(&self, session: &mut Session) -> TurnOutcome {
        tracing::info!(session = %session.id(), "Turn cancelled");
        self.ui.emit(AgentEvent::TurnCancelled);
        session.transition(LoopState::AwaitingInput);
        TurnOutcome::Cancelled
    }

    fn finish(&self, session: &mut Session) {
        session.transition(LoopState::Done);
        session.transition(LoopState::AwaitingInput);
    }
}

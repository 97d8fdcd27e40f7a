//! Per-conversation state and turn cancellation.

use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::approval::{ApprovalGate, ApprovalMode};
use super::message::MessageStore;

/// Where the agent loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingInput,
    Completing,
    ToolPhase,
    Done,
}

/// One conversation: history, approval mode and round counter.
///
/// Lives for one run of the agent loop and is passed to it explicitly.
pub struct Session {
    id: Uuid,
    store: MessageStore,
    gate: ApprovalGate,
    state: LoopState,
    rounds: u32,
}

impl Session {
    pub fn new(mode: ApprovalMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            store: MessageStore::new(),
            gate: ApprovalGate::new(mode),
            state: LoopState::AwaitingInput,
            rounds: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn mode(&self) -> ApprovalMode {
        self.gate.mode()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Completions run in the current turn.
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub(crate) fn store_mut(&mut self) -> &mut MessageStore {
        &mut self.store
    }

    pub(crate) fn gate(&self) -> &ApprovalGate {
        &self.gate
    }

    pub(crate) fn transition(&mut self, next: LoopState) {
        tracing::debug!(session = %self.id, from = ?self.state, to = ?next, "Loop state transition");
        self.state = next;
    }

    pub(crate) fn start_round(&mut self) -> u32 {
        self.rounds += 1;
        self.rounds
    }

    pub(crate) fn reset_rounds(&mut self) {
        self.rounds = 0;
    }
}

/// Handle for cancelling the turn in flight from outside the loop.
#[derive(Clone, Default)]
pub struct TurnCanceller {
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl TurnCanceller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh token for a new turn.
    pub(crate) fn start_turn(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.slot() = Some(token.clone());
        token
    }

    pub(crate) fn finish_turn(&self) {
        *self.slot() = None;
    }

    /// Cancel the turn in flight. Returns false when no turn is running.
    pub fn cancel(&self) -> bool {
        match self.slot().as_ref() {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn is_turn_running(&self) -> bool {
        self.slot().is_some()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        // A token slot is always valid, even after a panic elsewhere.
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

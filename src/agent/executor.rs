//! Tool executor: runs an approved call and always produces a [`ToolResult`].
//!
//! A run abandoned on cancellation is reported as `error`, since the handler
//! already started and may have had effects. `denied` is reserved for calls
//! that never started.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::message::{ToolCall, ToolResult};
use crate::tools::ToolRegistry;

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute an approved call.
    ///
    /// The handler runs on its own task. On timeout or cancellation that task
    /// is aborted and left behind; the loop never waits for it to wind down.
    pub async fn execute(&self, call: &ToolCall, cancel: &CancellationToken) -> ToolResult {
        let handler = match self.registry.lookup(call.name()) {
            Ok(handler) => handler,
            Err(e) => return ToolResult::error(call, e),
        };

        let args = call.arguments().clone();
        let workspace = self.registry.workspace().to_path_buf();
        let mut task = tokio::spawn(async move { handler.execute(args, &workspace).await });
        let abort = task.abort_handle();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                abort.abort();
                tracing::warn!(tool = %call.name(), id = %call.id(), "Tool execution cancelled");
                return ToolResult::error(call, "Tool execution cancelled");
            }
            outcome = tokio::time::timeout(self.timeout, &mut task) => outcome,
        };

        match outcome {
            Err(_) => {
                abort.abort();
                tracing::warn!(
                    tool = %call.name(),
                    id = %call.id(),
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Tool execution timed out"
                );
                ToolResult::timeout(
                    call,
                    format!("Tool timed out after {:.1}s", self.timeout.as_secs_f64()),
                )
            }
            Ok(Err(join_error)) => {
                tracing::error!(tool = %call.name(), id = %call.id(), error = %join_error, "Tool task failed");
                if join_error.is_panic() {
                    ToolResult::error(call, "Tool panicked during execution")
                } else {
                    ToolResult::error(call, "Tool task was aborted")
                }
            }
            Ok(Ok(Err(e))) => {
                tracing::debug!(tool = %call.name(), id = %call.id(), error = %e, "Tool returned an error");
                ToolResult::error(call, format!("{:#}", e))
            }
            Ok(Ok(Ok(payload))) => {
                tracing::debug!(tool = %call.name(), id = %call.id(), "Tool completed");
                ToolResult::ok(call, payload)
            }
        }
    }
}

//! Language model client boundary.
//!
//! The agent treats the provider as opaque transport: it hands over the
//! history, the system prompt and the tool specs, and receives a finite stream
//! of deltas. Assembling those deltas into text or tool calls is the
//! completion driver's job.

mod openai;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

use crate::agent::Message;
use crate::tools::ToolSpec;

pub use openai::OpenAiCompatClient;

/// Everything a provider needs for one completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
}

/// Fragment of a tool call as streamed by the provider.
///
/// Fragments sharing an `index` belong to the same call; `arguments` pieces
/// concatenate into the call's JSON argument text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
}

/// One increment of a streamed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamDelta {
    Text(String),
    ToolCall(ToolCallDelta),
}

/// Lazy, finite stream of deltas. The end of the stream marks completion.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamDelta, TransportError>> + Send>>;

/// The provider could not be reached or broke the stream.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Could not decode stream chunk: {0}")]
    Decode(String),
}

/// Transport to a chat-completion API.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Start a streamed completion.
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<DeltaStream, TransportError>;
}

//! Text generation for spirit conversations.
//!
//! The [`CompletionService`] trait is the seam the server streams from;
//! [`LlmClient`] implements it against any OpenAI-compatible
//! `/chat/completions` endpoint (OpenAI itself or a local Ollama).

mod client;
mod provider;
pub mod spirit;

use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use chat_proto::Role;
use futures::Stream;
use serde::{Deserialize, Serialize};

pub use client::LlmClient;
pub use provider::{LlmProvider, LlmSettings};
pub use spirit::{generate_spirit, SpiritProfile};

/// A single prompt message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Generated text arriving incrementally, in generation order.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Start a completion and stream the reply as text deltas.
    ///
    /// Errors before the first delta (bad status, unreachable host) are
    /// returned directly; later failures arrive as an `Err` item.
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<DeltaStream>;

    /// Run a non-streamed completion that must answer with a JSON object.
    async fn complete_json(&self, messages: &[ChatMessage]) -> Result<serde_json::Value>;
}

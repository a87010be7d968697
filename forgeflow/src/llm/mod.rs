//! Text completion backends.
//!
//! The core treats an LLM as an opaque `complete(model, prompt) -> text`
//! capability; the completion-backed planner and generator in
//! [`crate::pipeline`] are written against [`CompletionModel`] only.

#[cfg(feature = "ollama")]
mod ollama;

#[cfg(feature = "ollama")]
pub use ollama::{OllamaClient, OllamaOptions};

use async_trait::async_trait;

/// A single-turn text completion capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Completes `prompt` with `model`.
    async fn complete(&self, model: &str, prompt: &str) -> anyhow::Result<String>;
}

use async_trait::async_trait;

use crate::errors::PilotResult;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse};

/// Unified vision-language provider trait. All upstream adapters implement it
/// and are registered from config.toml.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider's identifier (matches config.toml key).
    fn name(&self) -> &str;

    /// Runs one completion and returns the generated text.
    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> PilotResult<LlmResponse>;
}

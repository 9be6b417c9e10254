use async_trait::async_trait;
use herald_core::HeraldResult;

/// Backend contract for LLM-assisted reasoning.
///
/// Implementations wrap a chat-completion API. The reasoning agent treats
/// every failure as "no answer" and falls back to its heuristics, so a
/// flaky backend can never break orchestration.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Completes a prompt, returning the model's text response.
    async fn complete(&self, prompt: &str) -> HeraldResult<String>;
}

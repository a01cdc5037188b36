use async_trait::async_trait;
use praxis_core::PraxisResult;
use std::future::Future;
use tracing::warn;

/// Sampling parameters for a completion call.
#[derive(Debug, Clone)]
pub struct CompletionParams {
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1500,
        }
    }
}

/// External natural-language completion collaborator.
///
/// Calls are expected to be idempotent from the engine's perspective;
/// transient failures (rate limit, timeout) surface as
/// `PraxisError::Compute` and are retried once by the protocol.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Produce a completion for `prompt`.
    async fn complete(&self, prompt: &str, params: &CompletionParams) -> PraxisResult<String>;
}

/// Verdict returned by the safety-analysis collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No confidential or adversarial content detected.
    Safe,
    /// Content must not be admitted; carries the reason.
    Unsafe(String),
}

impl Verdict {
    /// Whether this verdict admits the content.
    pub fn is_safe(&self) -> bool {
        matches!(self, Verdict::Safe)
    }
}

/// External safety-analysis collaborator.
#[async_trait]
pub trait SafetyProvider: Send + Sync {
    /// Analyze `text` for confidential information or adversarial intent.
    async fn analyze(&self, text: &str) -> PraxisResult<Verdict>;
}

/// Run an idempotent operation, retrying once on failure.
pub(crate) async fn retry_once<T, F, Fut>(mut op: F) -> PraxisResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PraxisResult<T>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(first) => {
            warn!(error = %first, "collaborator call failed, retrying once");
            op().await
        }
    }
}

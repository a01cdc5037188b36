use crate::providers::{retry_once, SafetyProvider, Verdict};
use praxis_cache::{args_key, MemoCache};
use praxis_core::{PraxisError, PraxisResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Keywords whose presence flags content as sensitive.
const SENSITIVE_KEYWORDS: &[&str] = &[
    "confidential",
    "secret",
    "private",
    "personal",
    "sensitive",
    "password",
    "ssn",
    "social security",
    "credit card",
    "phone number",
    "email address",
    "classified",
    "internal only",
    "not for distribution",
    "proprietary",
    "restricted",
];

/// Substrings typical of prompt-injection attempts.
const INJECTION_PATTERNS: &[&str] = &["ignore previous", "act as", "you are now"];

/// Combined safety check applied before a turn is admitted.
///
/// A fast local pass (keyword and injection-pattern matching) runs first;
/// only content that survives it reaches the external analysis provider,
/// whose verdicts are memoized per content. The gate fails closed: if the
/// provider is unreachable after a retry, content is treated as unsafe.
pub struct SafetyGate {
    provider: Arc<dyn SafetyProvider>,
    keywords: Vec<String>,
    injection_patterns: Vec<String>,
    verdicts: MemoCache<Verdict>,
}

impl SafetyGate {
    /// Create a gate over the given analysis provider with the default
    /// keyword lists and a 5-minute verdict cache.
    pub fn new(provider: Arc<dyn SafetyProvider>) -> Self {
        Self::with_cache(provider, Duration::from_secs(300), 256)
    }

    /// Create a gate with explicit verdict-cache settings.
    pub fn with_cache(provider: Arc<dyn SafetyProvider>, ttl: Duration, capacity: usize) -> Self {
        Self {
            provider,
            keywords: SENSITIVE_KEYWORDS.iter().map(|s| (*s).to_string()).collect(),
            injection_patterns: INJECTION_PATTERNS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            verdicts: MemoCache::new("safety-verdicts", ttl, capacity),
        }
    }

    /// Extend the sensitive-keyword list.
    pub fn with_keywords(mut self, extra: &[&str]) -> Self {
        self.keywords.extend(extra.iter().map(|s| (*s).to_string()));
        self
    }

    /// Drop expired cached verdicts. Returns how many were removed.
    pub async fn evict_expired(&self) -> usize {
        self.verdicts.evict_expired().await
    }

    fn local_check(&self, text: &str) -> Option<String> {
        let lowered = text.to_lowercase();
        if self
            .injection_patterns
            .iter()
            .any(|p| lowered.contains(p.as_str()))
        {
            return Some("prompt injection detected".to_string());
        }
        if self.keywords.iter().any(|k| lowered.contains(k.as_str())) {
            return Some("sensitive information detected".to_string());
        }
        None
    }

    /// Check `text`; `Ok(())` admits it, `SecurityRejected` blocks it.
    pub async fn check(&self, text: &str) -> PraxisResult<()> {
        if let Some(reason) = self.local_check(text) {
            debug!(%reason, "local safety check rejected content");
            return Err(PraxisError::SecurityRejected(reason));
        }

        let key = args_key(&["analyze", text]);
        let provider = Arc::clone(&self.provider);
        let verdict = self
            .verdicts
            .get_or_compute(&key, || async move {
                match retry_once(|| provider.analyze(text)).await {
                    Ok(verdict) => Ok(verdict),
                    Err(e) => {
                        // Fail closed, but do not cache: the provider may
                        // recover before the content is resubmitted.
                        warn!(error = %e, "safety analysis unavailable, treating as unsafe");
                        Err(e)
                    }
                }
            })
            .await
            .unwrap_or_else(|_| Verdict::Unsafe("security analysis unavailable".to_string()));

        match verdict {
            Verdict::Safe => Ok(()),
            Verdict::Unsafe(reason) => Err(PraxisError::SecurityRejected(reason)),
        }
    }
}

//! Generative providers
//!
//! An ordered list of interchangeable text-generation backends behind one
//! trait. The chain tries entries strictly in priority order and advances on
//! any failure without retrying the same entry; exhaustion hands control
//! back to the extractive synthesizer, so generation is never the sole path
//! to an answer.

mod chat;
mod huggingface;

pub use chat::ChatCompletionProvider;
pub use huggingface::HuggingFaceProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Responses at or below this length are treated as a provider failure.
const MIN_RESPONSE_LEN: usize = 10;

#[derive(Error, Debug)]
pub enum ProviderError {
    /// Backend not configured; skipped silently, never user-visible
    #[error("Provider is not configured")]
    Unavailable,

    /// Transport-level failure (connect, timeout, TLS)
    #[error("Request failed: {0}")]
    Http(String),

    /// The service answered with an error status (quota, auth, bad request)
    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The service answered but the payload was unusable
    #[error("Provider returned an empty or unusable response")]
    EmptyResponse,

    /// Every configured entry failed
    #[error("All providers in the chain failed")]
    Exhausted,
}

/// One generative backend
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// Short identifier used in logs ("groq", "openai", ...)
    fn name(&self) -> &str;

    /// Generate text from a system + user prompt pair.
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError>;

    /// Whether this entry is configured and worth calling
    fn is_available(&self) -> bool {
        true
    }
}

/// Configuration for one chain entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntryConfig {
    /// Display name, also used in logs
    pub name: String,
    /// Wire protocol: "chat" (OpenAI-compatible) or "huggingface"
    pub kind: String,
    /// Base URL of the service
    pub base_url: String,
    /// Model identifier sent with each request
    pub model: String,
    /// Environment variable holding the bearer token
    pub api_key_env: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Token budget per response
    pub max_tokens: u32,
}

/// Ordered fallback chain over generative providers
#[derive(Default, Clone)]
pub struct ProviderChain {
    providers: Vec<Arc<dyn GenerativeProvider>>,
}

impl ProviderChain {
    pub fn new(providers: Vec<Arc<dyn GenerativeProvider>>) -> Self {
        Self { providers }
    }

    /// Build a chain from config, skipping entries whose token environment
    /// variable is absent. Missing configuration is not an error at startup.
    pub fn from_config(entries: &[ProviderEntryConfig]) -> Self {
        let mut providers: Vec<Arc<dyn GenerativeProvider>> = Vec::new();

        for entry in entries {
            let Ok(api_key) = std::env::var(&entry.api_key_env) else {
                debug!(provider = %entry.name, env = %entry.api_key_env, "provider not configured, skipping");
                continue;
            };

            match entry.kind.as_str() {
                "chat" => providers.push(Arc::new(ChatCompletionProvider::new(entry, api_key))),
                "huggingface" => {
                    providers.push(Arc::new(HuggingFaceProvider::new(entry, api_key)))
                }
                other => {
                    warn!(provider = %entry.name, kind = %other, "unknown provider kind, skipping");
                }
            }
        }

        Self { providers }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Try every entry in order; return the first usable response.
    ///
    /// A usable response is non-empty and longer than 10 characters after
    /// trimming. Failures are logged and the chain advances; the same entry
    /// is never retried within a call.
    pub async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError> {
        for provider in &self.providers {
            if !provider.is_available() {
                continue;
            }

            debug!(provider = provider.name(), "trying generative provider");
            match provider.generate(system_prompt, user_prompt).await {
                Ok(text) => {
                    let trimmed = text.trim();
                    if trimmed.len() > MIN_RESPONSE_LEN {
                        debug!(
                            provider = provider.name(),
                            chars = trimmed.len(),
                            "provider produced a response"
                        );
                        return Ok(trimmed.to_string());
                    }
                    warn!(
                        provider = provider.name(),
                        chars = trimmed.len(),
                        "response too short, advancing to next provider"
                    );
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "provider failed, advancing");
                }
            }
        }

        Err(ProviderError::Exhausted)
    }
}

/// Default chain order: fast inference first, general-purpose completion
/// late, a hosted-inference backup last.
pub fn default_provider_entries() -> Vec<ProviderEntryConfig> {
    vec![
        ProviderEntryConfig {
            name: "groq".to_string(),
            kind: "chat".to_string(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            temperature: 0.3,
            max_tokens: 1024,
        },
        ProviderEntryConfig {
            name: "together".to_string(),
            kind: "chat".to_string(),
            base_url: "https://api.together.xyz/v1".to_string(),
            model: "meta-llama/Llama-3.3-70B-Instruct-Turbo".to_string(),
            api_key_env: "TOGETHER_API_KEY".to_string(),
            temperature: 0.3,
            max_tokens: 1024,
        },
        ProviderEntryConfig {
            name: "openrouter".to_string(),
            kind: "chat".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "meta-llama/llama-3.1-8b-instruct".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            temperature: 0.3,
            max_tokens: 1024,
        },
        ProviderEntryConfig {
            name: "openai".to_string(),
            kind: "chat".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.3,
            max_tokens: 1024,
        },
        ProviderEntryConfig {
            name: "huggingface".to_string(),
            kind: "huggingface".to_string(),
            base_url: "https://api-inference.huggingface.co".to_string(),
            model: "mistralai/Mistral-7B-Instruct-v0.3".to_string(),
            api_key_env: "HF_API_TOKEN".to_string(),
            temperature: 0.3,
            max_tokens: 512,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedProvider {
        name: &'static str,
        outcome: Result<String, fn() -> ProviderError>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn ok(name: &'static str, text: &str) -> Self {
            Self {
                name,
                outcome: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(name: &'static str, err: fn() -> ProviderError) -> Self {
            Self {
                name,
                outcome: Err(err),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerativeProvider for ScriptedProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn generate(&self, _s: &str, _u: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.outcome {
                Ok(text) => Ok(text.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    #[tokio::test]
    async fn test_chain_returns_first_success() {
        let first = Arc::new(ScriptedProvider::ok("first", "a sufficiently long answer"));
        let second = Arc::new(ScriptedProvider::ok("second", "should never be reached"));
        let chain = ProviderChain::new(vec![first.clone(), second.clone()]);

        let answer = chain.generate("sys", "user").await.unwrap();
        assert_eq!(answer, "a sufficiently long answer");
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_chain_advances_on_error_without_retry() {
        let failing = Arc::new(ScriptedProvider::failing("broken", || ProviderError::Api {
            status: 429,
            message: "quota".to_string(),
        }));
        let backup = Arc::new(ScriptedProvider::ok("backup", "the backup answered instead"));
        let chain = ProviderChain::new(vec![failing.clone(), backup.clone()]);

        let answer = chain.generate("sys", "user").await.unwrap();
        assert_eq!(answer, "the backup answered instead");
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_short_response_counts_as_failure() {
        let terse = Arc::new(ScriptedProvider::ok("terse", "ok"));
        let verbose = Arc::new(ScriptedProvider::ok("verbose", "a proper full-length response"));
        let chain = ProviderChain::new(vec![terse, verbose]);

        let answer = chain.generate("sys", "user").await.unwrap();
        assert_eq!(answer, "a proper full-length response");
    }

    #[tokio::test]
    async fn test_exhausted_chain() {
        let failing =
            Arc::new(ScriptedProvider::failing("down", || ProviderError::Http("timeout".to_string())));
        let chain = ProviderChain::new(vec![failing]);

        let err = chain.generate("sys", "user").await.unwrap_err();
        assert!(matches!(err, ProviderError::Exhausted));
    }

    #[tokio::test]
    async fn test_empty_chain_is_exhausted() {
        let chain = ProviderChain::default();
        assert!(chain.is_empty());
        let err = chain.generate("sys", "user").await.unwrap_err();
        assert!(matches!(err, ProviderError::Exhausted));
    }
}

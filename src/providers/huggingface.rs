//! Hugging Face hosted-inference provider, the chain's final backup
//!
//! The text-generation endpoint takes a single flattened prompt instead of
//! role-separated messages, so the system instruction is folded in above the
//! user content.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use super::{GenerativeProvider, ProviderEntryConfig, ProviderError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HuggingFaceProvider {
    client: reqwest::Client,
    name: String,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_new_tokens: u32,
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    inputs: &'a str,
    parameters: GenerationParameters,
}

#[derive(Serialize)]
struct GenerationParameters {
    max_new_tokens: u32,
    temperature: f32,
    return_full_text: bool,
}

#[derive(Deserialize)]
struct GenerationResponse {
    generated_text: String,
}

impl HuggingFaceProvider {
    pub fn new(entry: &ProviderEntryConfig, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            name: entry.name.clone(),
            base_url: entry.base_url.trim_end_matches('/').to_string(),
            model: entry.model.clone(),
            api_key,
            temperature: entry.temperature,
            max_new_tokens: entry.max_tokens,
        }
    }
}

#[async_trait]
impl GenerativeProvider for HuggingFaceProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError> {
        let prompt = format!("{system_prompt}\n\n{user_prompt}");
        let request = GenerationRequest {
            inputs: &prompt,
            parameters: GenerationParameters {
                max_new_tokens: self.max_new_tokens,
                temperature: self.temperature.max(0.01),
                return_full_text: false,
            },
        };

        debug!(provider = %self.name, model = %self.model, "sending generation request");

        let response = self
            .client
            .post(format!("{}/models/{}", self.base_url, self.model))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(provider = %self.name, error = %e, "transport failure");
                ProviderError::Http(e.to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            error!(provider = %self.name, status, %message, "API error");
            return Err(ProviderError::Api { status, message });
        }

        let parsed: Vec<GenerationResponse> = response
            .json()
            .await
            .map_err(|e| ProviderError::Http(format!("failed to parse response: {e}")))?;

        parsed
            .into_iter()
            .next()
            .map(|g| g.generated_text)
            .filter(|text| !text.trim().is_empty())
            .ok_or(ProviderError::EmptyResponse)
    }
}

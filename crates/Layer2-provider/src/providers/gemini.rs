//! Google Gemini client (generateContent, non-streaming)

use crate::{error::ProviderError, r#trait::ModelClient};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use vibe_foundation::{ModelSettings, SecretString, DEFAULT_MODEL_BASE_URL};

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8192;

/// Google Gemini client
pub struct GeminiClient {
    client: Client,
    model: String,
    max_output_tokens: u32,
    base_url: String,
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(model: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: Self::build_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS))?,
            model: model.into(),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            base_url: DEFAULT_MODEL_BASE_URL.to_string(),
        })
    }

    /// Create from the `model` section of the config
    pub fn from_settings(settings: &ModelSettings) -> Result<Self, ProviderError> {
        Ok(Self::new(settings.effective_name())?
            .with_timeout(Duration::from_secs(settings.effective_timeout()))?
            .with_max_output_tokens(settings.effective_max_output_tokens())
            .with_base_url(settings.effective_base_url()))
    }

    /// Set custom timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ProviderError> {
        self.client = Self::build_client(timeout)?;
        Ok(self)
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
        Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Network(format!("Failed to create HTTP client: {}", e)))
    }

    fn generate_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn build_request(&self, prompt: &str) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                max_output_tokens: self.max_output_tokens,
            },
        }
    }

    fn parse_error_response(status: reqwest::StatusCode, body: &str) -> ProviderError {
        // Try to parse as JSON error
        if let Ok(error_response) = serde_json::from_str::<GeminiErrorResponse>(body) {
            let error = error_response.error;
            let message = error.message;

            return match error.status.as_deref() {
                Some("RESOURCE_EXHAUSTED") => ProviderError::RateLimited {
                    retry_after_ms: None,
                },
                Some("PERMISSION_DENIED") | Some("UNAUTHENTICATED") => {
                    ProviderError::Authentication(message)
                }
                Some("INVALID_ARGUMENT")
                    if crate::error::is_invalid_key_message(&message)
                        || crate::error::is_invalid_key_message(body) =>
                {
                    ProviderError::Authentication(message)
                }
                Some("INVALID_ARGUMENT") => ProviderError::InvalidRequest(message),
                Some("NOT_FOUND") => ProviderError::ModelNotFound(message),
                Some("DEADLINE_EXCEEDED") => ProviderError::Timeout(message),
                _ => ProviderError::from_http_status(status.as_u16(), &message),
            };
        }

        ProviderError::from_http_status(status.as_u16(), body)
    }

    /// Concatenated text parts of the first candidate
    fn extract_text(response: GeminiResponse) -> Result<String, ProviderError> {
        let candidate = response.candidates.into_iter().next().ok_or_else(|| {
            ProviderError::InvalidResponse("No candidates in response".to_string())
        })?;

        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.is_empty() && candidate.finish_reason.as_deref() == Some("SAFETY") {
            return Err(ProviderError::ContentFiltered(
                "Response blocked by safety filters".to_string(),
            ));
        }

        Ok(text)
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate_content(
        &self,
        api_key: &SecretString,
        prompt: &str,
    ) -> Result<String, ProviderError> {
        let request = self.build_request(prompt);
        debug!("Gemini generateContent: model={}", self.model);

        let response = self
            .client
            .post(self.generate_url())
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", api_key.expose())
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(&e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::parse_error_response(status, &body));
        }

        let api_response: GeminiResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::InvalidResponse(e.to_string())
            }
        })?;

        Self::extract_text(api_response)
    }
}

// ============================================================================
// Gemini API Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

// Response types
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

// Error types
#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
    status: Option<String>,
}

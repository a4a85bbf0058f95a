//! Ollama model implementation.
//!
//! Talks to Ollama's local `/api/generate` endpoint with streaming disabled.

use async_trait::async_trait;
use hurricane_abstraction::{Model, ModelError, ModelParameters, ModelResponse, ModelUsage};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// Default Ollama server URL.
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Ollama model implementation.
#[derive(Debug, Clone)]
pub struct OllamaModel {
    /// The model ID (e.g., "codellama", "llama3:8b").
    model_id: String,
    /// The base URL for the Ollama API.
    base_url: String,
    /// Request timeout in seconds.
    timeout_secs: u64,
    /// HTTP client for making requests.
    client: Client,
}

impl OllamaModel {
    /// Creates a new `OllamaModel` against the default local server.
    ///
    /// # Errors
    /// Returns a `ModelError` if the HTTP client cannot be created.
    pub fn new(model_id: String) -> Result<Self, ModelError> {
        Self::with_base_url(model_id, DEFAULT_OLLAMA_HOST.to_string(), DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a new `OllamaModel` with a custom base URL and timeout.
    ///
    /// # Arguments
    /// * `model_id` - The Ollama model ID to use
    /// * `base_url` - The base URL for the Ollama API (e.g., "http://192.168.1.100:11434")
    /// * `timeout_secs` - Per-request timeout
    ///
    /// # Errors
    /// Returns a `ModelError` if the HTTP client cannot be created.
    pub fn with_base_url(
        model_id: String,
        base_url: String,
        timeout_secs: u64,
    ) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ModelError::RequestError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            model_id,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_secs,
            client,
        })
    }

    /// Returns the base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_options(parameters: Option<ModelParameters>) -> Option<OllamaOptions> {
        parameters.map(|p| OllamaOptions {
            temperature: p.temperature,
            num_predict: p.max_tokens,
            stop: p.stop_sequences,
        })
    }

    fn map_send_error(&self, e: &reqwest::Error) -> ModelError {
        error!(error = %e, base_url = %self.base_url, "Failed to reach Ollama");
        if e.is_timeout() {
            ModelError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            ModelError::RequestError(format!(
                "Ollama server not reachable at {}. Start it with 'ollama serve'.",
                self.base_url
            ))
        } else {
            ModelError::RequestError(format!("Network error: {}", e))
        }
    }
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaError {
    error: String,
}

#[async_trait]
impl Model for OllamaModel {
    async fn generate_text(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        debug!(
            model_id = %self.model_id,
            prompt_len = prompt.len(),
            parameters = ?parameters,
            "OllamaModel generating text"
        );

        let url = format!("{}/api/generate", self.base_url);
        let request_body = OllamaGenerateRequest {
            model: &self.model_id,
            prompt,
            system: system_prompt,
            stream: false,
            options: Self::build_options(parameters),
        };

        let response = self
            .client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| self.map_send_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "Ollama API returned error status");

            let not_found = serde_json::from_str::<OllamaError>(&error_text)
                .is_ok_and(|e| e.error.contains("model") && e.error.contains("not found"));
            if not_found || status == reqwest::StatusCode::NOT_FOUND {
                return Err(ModelError::ModelResponseError(format!(
                    "Model '{}' not found. Pull it with 'ollama pull {}'.",
                    self.model_id, self.model_id
                )));
            }
            if status.is_server_error() {
                return Err(ModelError::RequestError(format!(
                    "Ollama server error ({}): {}",
                    status, error_text
                )));
            }
            return Err(ModelError::ModelResponseError(format!(
                "API error ({}): {}",
                status, error_text
            )));
        }

        let ollama_response: OllamaResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse Ollama API response");
            ModelError::SerializationError(format!("Failed to parse response: {}", e))
        })?;

        let prompt_tokens = ollama_response.prompt_eval_count.unwrap_or(0);
        let completion_tokens = ollama_response.eval_count.unwrap_or(0);

        Ok(ModelResponse {
            content: ollama_response.response,
            model_id: Some(self.model_id.clone()),
            usage: Some(ModelUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            }),
        })
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

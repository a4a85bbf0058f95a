//! Model abstraction layer for Hurricane.
//!
//! This module defines the text-generation boundary used by the planner and by
//! model-backed execution strategies.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Represents an error that can occur when interacting with a text-generation model.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelError {
    /// An error occurred during the API request (e.g., server unreachable).
    #[error("Request Error: {0}")]
    RequestError(String),

    /// The request did not complete within the configured timeout.
    #[error("Timeout after {0}s")]
    Timeout(u64),

    /// The model returned an error (e.g., model missing, out of memory).
    #[error("Model Response Error: {0}")]
    ModelResponseError(String),

    /// An error occurred during serialization or deserialization.
    #[error("Serialization Error: {0}")]
    SerializationError(String),

    /// The model provider is not supported or configured.
    #[error("Unsupported Model Provider: {0}")]
    UnsupportedModelProvider(String),

    /// Other unexpected errors.
    #[error("Other Model Error: {0}")]
    Other(String),
}

impl ModelError {
    /// Returns true when retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RequestError(_) | Self::Timeout(_))
    }
}

/// Parameters for controlling the model's generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    /// What sampling temperature to use, between 0 and 2.
    pub temperature: Option<f32>,

    /// The maximum number of tokens to generate.
    pub max_tokens: Option<u32>,

    /// Sequences where the model will stop generating further tokens.
    pub stop_sequences: Option<Vec<String>>,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self { temperature: Some(0.7), max_tokens: Some(2048), stop_sequences: None }
    }
}

/// The response from a text generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// The generated content.
    pub content: String,

    /// Optional: The ID of the model used to generate the response.
    pub model_id: Option<String>,

    /// Optional: Usage statistics for the request.
    pub usage: Option<ModelUsage>,
}

/// Usage statistics for a model request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUsage {
    /// Number of tokens in the prompt.
    pub prompt_tokens: u32,

    /// Number of tokens in the completion.
    pub completion_tokens: u32,

    /// Total number of tokens used.
    pub total_tokens: u32,
}

/// A trait for interacting with text-generation models.
///
/// All models must be `Send + Sync` so a single instance can be shared by the
/// planner and every execution unit.
#[async_trait]
pub trait Model: Send + Sync {
    /// Generates a text completion for the given prompt.
    ///
    /// # Arguments
    /// * `prompt` - The input prompt for text generation
    /// * `system_prompt` - Optional system instruction framing the request
    /// * `parameters` - Optional parameters to control generation
    ///
    /// # Errors
    /// Returns a `ModelError` if generation fails or times out.
    async fn generate_text(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError>;

    /// Returns the ID of the model.
    fn model_id(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ModelError::RequestError("down".to_string()).is_transient());
        assert!(ModelError::Timeout(30).is_transient());
        assert!(!ModelError::ModelResponseError("bad".to_string()).is_transient());
        assert!(!ModelError::SerializationError("bad".to_string()).is_transient());
        assert!(!ModelError::Other("x".to_string()).is_transient());
    }

    #[test]
    fn test_default_parameters() {
        let params = ModelParameters::default();
        assert_eq!(params.temperature, Some(0.7));
        assert_eq!(params.max_tokens, Some(2048));
        assert!(params.stop_sequences.is_none());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(ModelError::Timeout(30).to_string(), "Timeout after 30s");
        assert_eq!(
            ModelError::RequestError("refused".to_string()).to_string(),
            "Request Error: refused"
        );
    }
}

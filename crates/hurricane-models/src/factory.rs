//! Model factory for creating model instances from configuration.

use crate::{MockModel, OllamaModel};
use crate::ollama::{DEFAULT_OLLAMA_HOST, DEFAULT_TIMEOUT_SECS};
use hurricane_abstraction::{Model, ModelError};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error};

/// Model type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// Mock model for testing.
    Mock,
    /// Ollama local model.
    Ollama,
}

impl FromStr for ModelType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "ollama" | "local" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Model configuration.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// The type of model to create.
    pub model_type: ModelType,
    /// The model ID (e.g., "codellama").
    pub model_id: String,
    /// Optional base URL (defaults to the local Ollama server).
    pub base_url: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl ModelConfig {
    /// Creates a new `ModelConfig` with the given type and model ID.
    #[must_use]
    pub fn new(model_type: ModelType, model_id: String) -> Self {
        Self { model_type, model_id, base_url: None, timeout_secs: DEFAULT_TIMEOUT_SECS }
    }

    /// Sets the base URL for this configuration.
    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Sets the request timeout for this configuration.
    #[must_use]
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Factory for creating model instances.
pub struct ModelFactory;

impl ModelFactory {
    /// Creates a model instance from the given configuration.
    ///
    /// # Errors
    /// Returns a `ModelError` if the HTTP client cannot be created.
    pub fn create(config: ModelConfig) -> Result<Arc<dyn Model>, ModelError> {
        debug!(
            model_type = ?config.model_type,
            model_id = %config.model_id,
            "Creating model instance"
        );

        match config.model_type {
            ModelType::Mock => Ok(Arc::new(MockModel::new(config.model_id))),
            ModelType::Ollama => {
                let base_url = config.base_url.unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string());
                let model = OllamaModel::with_base_url(config.model_id, base_url, config.timeout_secs)?;
                Ok(Arc::new(model))
            }
        }
    }

    /// Creates a model instance from a provider string and model ID.
    ///
    /// # Errors
    /// Returns a `ModelError` if the provider is unrecognized or creation fails.
    pub fn create_from_str(provider: &str, model_id: String) -> Result<Arc<dyn Model>, ModelError> {
        let model_type = ModelType::from_str(provider).map_err(|()| {
            error!(provider = %provider, "Unrecognized model provider");
            ModelError::UnsupportedModelProvider(format!("Unrecognized model type: {}", provider))
        })?;
        Self::create(ModelConfig::new(model_type, model_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_type_from_str() {
        assert_eq!(ModelType::from_str("mock"), Ok(ModelType::Mock));
        assert_eq!(ModelType::from_str("Ollama"), Ok(ModelType::Ollama));
        assert_eq!(ModelType::from_str("local"), Ok(ModelType::Ollama));
        assert!(ModelType::from_str("gpt").is_err());
    }

    #[test]
    fn test_create_mock() {
        let model = ModelFactory::create(ModelConfig::new(ModelType::Mock, "m".to_string())).unwrap();
        assert_eq!(model.model_id(), "m");
    }

    #[test]
    fn test_create_ollama_with_base_url() {
        let config = ModelConfig::new(ModelType::Ollama, "codellama".to_string())
            .with_base_url("http://127.0.0.1:9".to_string())
            .with_timeout(2);
        let model = ModelFactory::create(config).unwrap();
        assert_eq!(model.model_id(), "codellama");
    }

    #[test]
    fn test_create_from_str_unknown() {
        let result = ModelFactory::create_from_str("nope", "x".to_string());
        assert!(matches!(result, Err(ModelError::UnsupportedModelProvider(_))));
    }
}

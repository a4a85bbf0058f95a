//! Model implementations for Hurricane.
//!
//! - **Ollama**: local models served over Ollama's HTTP API
//! - **Mock**: scripted responses for testing and offline development

use async_trait::async_trait;
use hurricane_abstraction::{Model, ModelError, ModelParameters, ModelResponse};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

pub mod factory;
pub mod ollama;

pub use factory::{ModelConfig, ModelFactory, ModelType};
pub use ollama::OllamaModel;

/// A mock model for testing.
///
/// Without scripted responses it echoes the prompt. Scripted responses are
/// returned in order; once exhausted the model goes back to echoing.
#[derive(Debug)]
pub struct MockModel {
    id: String,
    responses: Mutex<VecDeque<Result<String, ModelError>>>,
    failure: Option<ModelError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockModel {
    /// Creates a new echoing `MockModel` with the given ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            responses: Mutex::new(VecDeque::new()),
            failure: None,
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Creates a `MockModel` that replies with `responses` in order.
    pub fn with_responses<I, S>(id: impl Into<String>, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let model = Self::new(id);
        if let Ok(mut queue) = model.responses.lock() {
            queue.extend(responses.into_iter().map(|r| Ok(r.into())));
        }
        model
    }

    /// Creates a `MockModel` whose every call fails with `error`.
    pub fn failing(id: impl Into<String>, error: ModelError) -> Self {
        let mut model = Self::new(id);
        model.failure = Some(error);
        model
    }

    /// Queues a single scripted result.
    pub fn push_result(&self, result: Result<String, ModelError>) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(result);
        }
    }

    /// Delays every response by `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `generate_text` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Model for MockModel {
    async fn generate_text(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        debug!(
            model_id = %self.id,
            prompt_len = prompt.len(),
            has_system = system_prompt.is_some(),
            parameters = ?parameters,
            "MockModel generating text"
        );
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        let scripted = self.responses.lock().ok().and_then(|mut queue| queue.pop_front());
        let content = match scripted {
            Some(result) => result?,
            None => format!("Mock response for: {prompt}"),
        };

        Ok(ModelResponse { content, model_id: Some(self.id.clone()), usage: None })
    }

    fn model_id(&self) -> &str {
        &self.id
    }
}

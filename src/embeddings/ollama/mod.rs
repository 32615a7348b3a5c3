
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::Config;
use crate::embeddings::Embedder;
use crate::generation::TextGenerator;
use crate::{Result, StudyError};

const DEFAULT_RETRY_ATTEMPTS: u32 = 1;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Blocking client for the Ollama embedding and chat endpoints
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    embedding_model: String,
    generation_model: String,
    batch_size: u32,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

/// The embedding service rejects raw newlines, so they are flattened first
#[inline]
pub fn normalize_input(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .map_err(|e| StudyError::Config(format!("Failed to build Ollama URL: {e}")))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.ollama.timeout()))
            .build()
            .into();

        Ok(Self {
            base_url,
            embedding_model: config.ollama.embedding_model.clone(),
            generation_model: config.ollama.generation_model.clone(),
            batch_size: config.ollama.batch_size,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    /// Opt into retrying 5xx and transport failures; the default is a single attempt
    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    #[inline]
    pub fn generation_model(&self) -> &str {
        &self.generation_model
    }

    /// Test connection to Ollama server and verify both models are installed
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        let models = self.list_models()?;
        for wanted in [&self.embedding_model, &self.generation_model] {
            if !models.iter().any(|m| model_matches(&m.name, wanted)) {
                let available_models: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
                warn!(
                    "Model {} not found. Available models: {:?}",
                    wanted, available_models
                );
                return Err(StudyError::Service(format!(
                    "Model '{}' is not available. Available models: {:?}",
                    wanted, available_models
                )));
            }
        }

        info!(
            "Health check passed for Ollama server at {} with models {} and {}",
            self.base_url, self.embedding_model, self.generation_model
        );
        Ok(())
    }

    /// List all available models
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.endpoint("/api/tags")?;

        debug!("Fetching available models from {}", url);

        let response_text = self.make_request_with_retry(|| {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let models_response: ModelsResponse = serde_json::from_str(&response_text)
            .map_err(|e| StudyError::Service(format!("Failed to parse models response: {e}")))?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    /// Generate embeddings for texts, splitting into requests of at most `batch_size`
    #[inline]
    pub fn generate_embeddings_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());

        // Process in batches to avoid overwhelming the server
        for chunk in texts.chunks(self.batch_size.max(1) as usize) {
            let normalized: Vec<String> = chunk.iter().map(|t| normalize_input(t)).collect();
            let batch = self.generate_embeddings_single_batch(&normalized)?;
            if let (Some(expected), Some(got)) = (
                results.first().map(Vec::len),
                batch.first().map(Vec::len),
            ) {
                if expected != got {
                    return Err(StudyError::Service(format!(
                        "Embedding dimension changed between batches: {expected} vs {got}"
                    )));
                }
            }
            results.extend(batch);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    fn generate_embeddings_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.embedding_model,
            input: texts,
        };

        let url = self.endpoint("/api/embed")?;

        let request_json = serde_json::to_string(&request).map_err(|e| {
            StudyError::Service(format!("Failed to serialize embedding request: {e}"))
        })?;

        let response_text = self.make_request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let embed_response: EmbedResponse = serde_json::from_str(&response_text)
            .map_err(|e| StudyError::Service(format!("Failed to parse embedding response: {e}")))?;

        if embed_response.embeddings.len() != texts.len() {
            return Err(StudyError::Service(format!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                embed_response.embeddings.len()
            )));
        }

        if let Some(dimension) = embed_response.embeddings.first().map(Vec::len) {
            if dimension == 0
                || embed_response
                    .embeddings
                    .iter()
                    .any(|embedding| embedding.len() != dimension)
            {
                return Err(StudyError::Service(
                    "Embedding response contains empty or mixed-dimension vectors".to_string(),
                ));
            }
        }

        Ok(embed_response.embeddings)
    }

    /// Send a chat completion with an optional system message and token cap
    #[inline]
    pub fn chat(
        &self,
        system: Option<&str>,
        user: Option<&str>,
        max_tokens: Option<u32>,
    ) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        if let Some(user) = user {
            messages.push(ChatMessage {
                role: "user".to_string(),
                content: user.to_string(),
            });
        }
        if messages.is_empty() {
            return Err(StudyError::InvalidArgument(
                "chat needs a system or user message".to_string(),
            ));
        }

        let request = ChatRequest {
            model: &self.generation_model,
            messages,
            stream: false,
            options: max_tokens.map(|num_predict| ChatOptions { num_predict }),
        };

        let url = self.endpoint("/api/chat")?;
        let request_json = serde_json::to_string(&request)
            .map_err(|e| StudyError::Service(format!("Failed to serialize chat request: {e}")))?;

        debug!(
            "Requesting completion from {} ({} prompt bytes)",
            self.generation_model,
            request_json.len()
        );

        let response_text = self.make_request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let chat_response: ChatResponse = serde_json::from_str(&response_text)
            .map_err(|e| StudyError::Service(format!("Failed to parse chat response: {e}")))?;

        Ok(chat_response.message.content)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| StudyError::Config(format!("Failed to build URL for {path}: {e}")))
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(StudyError::Service(format!(
                                    "Client error: HTTP {status}"
                                )));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            false
                        }
                    };

                    if !should_retry {
                        return Err(StudyError::Service(format!(
                            "Non-retryable error: {error}"
                        )));
                    }

                    last_error = Some(StudyError::Service(format!("Request error: {error}")));

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        let delay = Duration::from_millis(delay_ms);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All request attempts failed for {}", self.base_url);

        Err(last_error
            .unwrap_or_else(|| StudyError::Service("Request failed after retries".to_string())))
    }
}

/// Ollama reports untagged models with an implicit `:latest`
fn model_matches(installed: &str, wanted: &str) -> bool {
    installed == wanted
        || installed
            .strip_suffix(":latest")
            .is_some_and(|base| base == wanted)
}

impl Embedder for OllamaClient {
    #[inline]
    fn model_name(&self) -> &str {
        &self.embedding_model
    }

    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());
        self.generate_embeddings_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| StudyError::Service("Empty embedding response".to_string()))
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.generate_embeddings_batch(texts)
    }
}

impl TextGenerator for OllamaClient {
    #[inline]
    fn complete(
        &self,
        system: Option<&str>,
        user: Option<&str>,
        max_tokens: Option<u32>,
    ) -> Result<String> {
        self.chat(system, user, max_tokens)
    }
}

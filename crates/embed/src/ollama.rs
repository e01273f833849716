use async_trait::async_trait;
use codematch_common::{AppConfig, CodematchError, Result};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::types::{EmbedRequest, EmbedResponse};
use crate::vectoriser::{
    validate_transform_input, validate_transform_output, TransformHooks, Vectoriser,
};

const CLASS_NAME: &str = "OllamaVectoriser";

/// Embedding provider backed by a running Ollama server
#[derive(Debug, Clone)]
pub struct OllamaVectoriser {
    base_url: String,
    model: String,
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
    hooks: TransformHooks,
}

impl OllamaVectoriser {
    /// Create new Ollama vectoriser
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let model = model.into();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                CodematchError::configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        info!("Ollama vectoriser initialized: {} (model: {})", base_url, model);
        Ok(Self {
            base_url,
            model,
            client,
            max_retries: max_retries.max(1),
            retry_delay: Duration::from_secs(1),
            hooks: TransformHooks::new(),
        })
    }

    /// Create from application configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            &config.ollama_base_url,
            &config.embedding_model,
            Duration::from_secs(config.embed_timeout_secs),
            config.embed_max_retries,
        )
    }

    /// Install pre/post hooks around `transform`
    pub fn with_hooks(mut self, hooks: TransformHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Base delay of the exponential retry backoff
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Test connection to Ollama
    pub async fn test_connection(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            CodematchError::external_service(format!("Failed to connect to Ollama: {}", e))
        })?;
        Ok(response.status().is_success())
    }

    /// Embed with retry on transient failures
    async fn embed_with_retry(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);

        debug!(
            "Generating embeddings - Model: {}, Batch size: {}",
            self.model,
            texts.len()
        );

        let request = EmbedRequest {
            model: self.model.clone(),
            input: texts,
            truncate: Some(true),
        };

        let mut attempt = 1;
        loop {
            match self.try_embed(&url, &request).await {
                Ok(embeddings) => {
                    debug!("Received {} embeddings", embeddings.len());
                    return Ok(embeddings);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.retry_delay * 2u32.pow(attempt - 1);
                    warn!(
                        "Embedding request failed (attempt {}/{}): {}. Retrying in {:?}...",
                        attempt, self.max_retries, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e
                        .with_context("provider", CLASS_NAME)
                        .with_context("model", &self.model)
                        .with_context("attempts", attempt));
                }
            }
        }
    }

    /// Single attempt to embed a batch
    async fn try_embed(&self, url: &str, request: &EmbedRequest) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() { "timed out" } else { "failed" };
                CodematchError::external_service(format!(
                    "Embedding request {}: {}",
                    reason, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let result: EmbedResponse = response.json().await.map_err(|e| {
            CodematchError::vectorisation(format!("Failed to parse embedding response: {}", e))
        })?;

        Ok(result.embeddings)
    }
}

/// Map a non-success provider status onto the error taxonomy
fn classify_status(status: StatusCode, body: &str) -> CodematchError {
    let message = format!("Ollama embedding API error {}: {}", status, body.trim());
    let err = if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        CodematchError::external_service(message)
    } else if status == StatusCode::NOT_FOUND {
        CodematchError::configuration(message)
    } else {
        CodematchError::validation(message)
    };
    err.with_context("status", status.as_u16())
}

#[async_trait]
impl Vectoriser for OllamaVectoriser {
    fn class_name(&self) -> &str {
        CLASS_NAME
    }

    async fn transform(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        validate_transform_input(texts)?;
        let n_texts = texts.len();

        let texts = self.hooks.run_pre("transform", texts.to_vec())?;
        validate_transform_input(&texts)?;

        let embeddings = self.embed_with_retry(texts).await?;
        validate_transform_output(n_texts, &embeddings)?;

        let embeddings = self.hooks.run_post("transform", embeddings)?;
        validate_transform_output(n_texts, &embeddings)?;

        Ok(embeddings)
    }
}

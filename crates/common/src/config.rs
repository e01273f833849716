use crate::error::CodematchError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Codematch application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding the persisted vector store snapshot
    pub store_dir: PathBuf,

    /// Ollama API base URL
    pub ollama_base_url: String,

    /// Embedding model name
    pub embedding_model: String,

    /// Texts per embedding request when building / embedding
    pub embed_batch_size: usize,

    /// Queries per embedding request when searching
    pub search_batch_size: usize,

    /// Embedding request timeout in seconds
    pub embed_timeout_secs: u64,

    /// Attempts per embedding request before giving up
    pub embed_max_retries: u32,

    /// Path prefix the store endpoints are mounted under
    pub endpoint_name: String,

    /// Deduplication scoring method ("naive" or "average")
    pub scoring_method: String,

    /// Server bind address
    pub server_host: String,

    /// Server port
    pub server_port: u16,

    /// Log directory
    pub log_dir: PathBuf,

    /// Log level
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("./db/store"),
            ollama_base_url: "http://localhost:11434".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            embed_batch_size: 8,
            search_batch_size: 8,
            embed_timeout_secs: 60,
            embed_max_retries: 3,
            endpoint_name: "soc".to_string(),
            scoring_method: "naive".to_string(),
            server_host: "0.0.0.0".to_string(),
            server_port: 8000,
            log_dir: PathBuf::from("./db/log"),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self, CodematchError> {
        // Load .env file (ignore if not exists)
        let _ = dotenv::dotenv();

        let defaults = Self::default();
        let config = Self {
            store_dir: Self::get_env_path("STORE_DIR").unwrap_or(defaults.store_dir),
            ollama_base_url: std::env::var("OLLAMA_BASE_URL")
                .unwrap_or(defaults.ollama_base_url),
            embedding_model: std::env::var("EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            embed_batch_size: Self::get_env_parsed("EMBED_BATCH_SIZE")?
                .unwrap_or(defaults.embed_batch_size),
            search_batch_size: Self::get_env_parsed("SEARCH_BATCH_SIZE")?
                .unwrap_or(defaults.search_batch_size),
            embed_timeout_secs: Self::get_env_parsed("EMBED_TIMEOUT_SECS")?
                .unwrap_or(defaults.embed_timeout_secs),
            embed_max_retries: Self::get_env_parsed("EMBED_MAX_RETRIES")?
                .unwrap_or(defaults.embed_max_retries),
            endpoint_name: std::env::var("ENDPOINT_NAME")
                .map(|name| name.trim().trim_matches('/').to_string())
                .unwrap_or(defaults.endpoint_name),
            scoring_method: std::env::var("SCORING_METHOD").unwrap_or(defaults.scoring_method),
            server_host: std::env::var("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: Self::get_env_parsed("SERVER_PORT")?.unwrap_or(defaults.server_port),
            log_dir: Self::get_env_path("LOG_DIR").unwrap_or(defaults.log_dir),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        };

        config.validate()?;

        Ok(config)
    }

    /// Get PathBuf from environment variable
    fn get_env_path(key: &str) -> Option<PathBuf> {
        std::env::var(key).ok().map(PathBuf::from)
    }

    /// Parse an environment variable, failing loudly on garbage
    fn get_env_parsed<T: FromStr>(key: &str) -> Result<Option<T>, CodematchError> {
        match std::env::var(key) {
            Ok(raw) => raw.trim().parse().map(Some).map_err(|_| {
                CodematchError::configuration(format!("Invalid value for {}: '{}'", key, raw))
                    .with_context("variable", key)
            }),
            Err(_) => Ok(None),
        }
    }

    /// Ensure the log directory exists, create if not
    pub fn ensure_directories(&self) -> Result<(), CodematchError> {
        if !self.log_dir.exists() {
            std::fs::create_dir_all(&self.log_dir).map_err(|e| {
                CodematchError::configuration(format!(
                    "Failed to create directory {}: {}",
                    self.log_dir.display(),
                    e
                ))
            })?;
        }

        Ok(())
    }

    /// Get server bind address (host:port)
    pub fn server_bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Endpoint name as a bare path segment, without surrounding slashes
    pub fn endpoint_segment(&self) -> &str {
        self.endpoint_name.trim().trim_matches('/')
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), CodematchError> {
        if self.embedding_model.trim().is_empty() {
            return Err(CodematchError::configuration("Embedding model name cannot be empty"));
        }

        // Validate Ollama URL
        if !self.ollama_base_url.starts_with("http://")
            && !self.ollama_base_url.starts_with("https://")
        {
            return Err(CodematchError::configuration(
                "Ollama base URL must start with http:// or https://",
            ));
        }

        if self.embed_batch_size == 0 || self.search_batch_size == 0 {
            return Err(CodematchError::configuration("Batch sizes must be at least 1"));
        }

        if self.embed_max_retries == 0 {
            return Err(CodematchError::configuration("Embedding retries must be at least 1"));
        }

        let endpoint = self.endpoint_segment();
        if endpoint.is_empty() || endpoint.contains('/') {
            return Err(CodematchError::configuration(
                "Endpoint name must be a single non-empty path segment",
            ));
        }

        if !matches!(self.scoring_method.as_str(), "naive" | "average") {
            return Err(CodematchError::configuration(format!(
                "Unknown scoring method '{}', expected 'naive' or 'average'",
                self.scoring_method
            )));
        }

        // Validate port range
        if self.server_port == 0 {
            return Err(CodematchError::configuration("Server port cannot be 0"));
        }

        Ok(())
    }
}

use serde::{Deserialize, Serialize};

/// Ollama batch embed request (`/api/embed`)
#[derive(Debug, Clone, Serialize)]
pub struct EmbedRequest {
    /// Model name (e.g., "nomic-embed-text")
    pub model: String,

    /// Texts to embed
    pub input: Vec<String>,

    /// Truncate inputs that exceed the model context instead of failing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncate: Option<bool>,
}

/// Ollama batch embed response
#[derive(Debug, Clone, Deserialize)]
pub struct EmbedResponse {
    /// Model name
    #[serde(default)]
    pub model: String,

    /// One embedding per input text
    pub embeddings: Vec<Vec<f32>>,
}

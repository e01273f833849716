//! Codematch embedding providers
//!
//! The `Vectoriser` contract plus an Ollama backed implementation

mod ollama;
mod types;
mod vectoriser;

pub use ollama::OllamaVectoriser;
pub use types::{EmbedRequest, EmbedResponse};
pub use vectoriser::{
    validate_transform_input, validate_transform_output, TransformHooks, Vectoriser,
};

use async_trait::async_trait;
use codematch_common::{CodematchError, Hooks, Result};

/// Pre-hook over input texts, post-hook over the returned embedding rows
pub type TransformHooks = Hooks<Vec<String>, Vec<Vec<f32>>>;

/// Common trait for embedding providers
///
/// Implementations return exactly one row per input text, all rows with the
/// same non-zero dimension.
#[async_trait]
pub trait Vectoriser: Send + Sync {
    /// Provider name recorded in snapshot manifests
    fn class_name(&self) -> &str;

    /// Embed a batch of texts
    async fn transform(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Input contract of `Vectoriser::transform`
pub fn validate_transform_input(texts: &[String]) -> Result<()> {
    if texts.is_empty() {
        return Err(CodematchError::validation("No texts given to embed"));
    }

    if let Some(position) = texts.iter().position(|t| t.trim().is_empty()) {
        return Err(
            CodematchError::validation("All texts to embed must be non-empty strings")
                .with_context("position", position)
                .with_context("n_texts", texts.len()),
        );
    }

    Ok(())
}

/// Output contract of `Vectoriser::transform`, returns the embedding dimension
pub fn validate_transform_output(n_texts: usize, embeddings: &[Vec<f32>]) -> Result<usize> {
    if embeddings.len() != n_texts {
        return Err(CodematchError::vectorisation(format!(
            "Expected {} embeddings, got {}",
            n_texts,
            embeddings.len()
        ))
        .with_context("n_texts", n_texts)
        .with_context("n_embeddings", embeddings.len()));
    }

    let dim = embeddings.first().map(Vec::len).unwrap_or(0);
    if dim == 0 {
        return Err(CodematchError::vectorisation("Embeddings have zero dimension"));
    }

    for (row, embedding) in embeddings.iter().enumerate() {
        if embedding.len() != dim {
            return Err(CodematchError::vectorisation(format!(
                "Inconsistent embedding dimension: expected {}, got {}",
                dim,
                embedding.len()
            ))
            .with_context("row", row));
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(
                CodematchError::vectorisation("Embedding contains non-finite values")
                    .with_context("row", row),
            );
        }
    }

    Ok(dim)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_input_contract() {
        assert!(validate_transform_input(&texts(&["nurse", "baker"])).is_ok());

        let err = validate_transform_input(&[]).unwrap_err();
        assert_eq!(err.code(), "validation_error");

        let err = validate_transform_input(&texts(&["nurse", "   "])).unwrap_err();
        assert_eq!(err.code(), "validation_error");
        assert_eq!(err.context().unwrap().get("position").unwrap(), "1");
    }

    #[test]
    fn test_output_contract() {
        let good = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        assert_eq!(validate_transform_output(2, &good).unwrap(), 2);

        let err = validate_transform_output(3, &good).unwrap_err();
        assert_eq!(err.code(), "vectorisation_error");

        let ragged = vec![vec![1.0, 0.0], vec![1.0]];
        assert!(validate_transform_output(2, &ragged).is_err());

        let empty_rows = vec![Vec::new()];
        assert!(validate_transform_output(1, &empty_rows).is_err());

        let nan = vec![vec![f32::NAN, 0.0]];
        assert!(validate_transform_output(1, &nan).is_err());
    }
}

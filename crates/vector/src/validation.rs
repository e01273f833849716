//! Explicit validation functions for every data shape crossing a trust boundary
//!
//! Callers run these before any embedding or disk work; the store also runs
//! them again on whatever a hook hands back.

use codematch_common::{CodematchError, Result};
use codematch_embed::validate_transform_output;
use ndarray::Array2;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::similarity::l2_norm;
use crate::types::{
    is_reserved_column, CorpusRecord, EmbedQuery, EmbedResult, MetadataSchema, ReverseSearchQuery,
    ReverseSearchResult, SearchQuery, SearchResult,
};

/// Allowed deviation of a stored row's L2 norm from 1.0
pub const UNIT_NORM_TOLERANCE: f64 = 1e-4;

/// Rows checked for unit norm when loading a snapshot
pub const LOAD_NORM_SAMPLE: usize = 20;

pub fn validate_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(CodematchError::validation("batch_size must be at least 1"));
    }
    Ok(())
}

pub fn validate_n_results(n_results: usize) -> Result<()> {
    if n_results == 0 {
        return Err(CodematchError::validation("n_results must be at least 1"));
    }
    Ok(())
}

/// Non-empty list, unique non-blank ids, non-blank payload
fn validate_entries<'a>(
    kind: &str,
    field: &str,
    entries: impl ExactSizeIterator<Item = (&'a str, &'a str)>,
) -> Result<()> {
    if entries.len() == 0 {
        return Err(CodematchError::validation(format!("No {} entries given", kind)));
    }

    let mut seen = HashSet::new();
    for (position, (id, payload)) in entries.enumerate() {
        if id.trim().is_empty() {
            return Err(
                CodematchError::validation(format!("Every {} entry needs a non-empty 'id'", kind))
                    .with_context("position", position),
            );
        }
        if !seen.insert(id) {
            return Err(
                CodematchError::validation("'ids' must contain unique values.")
                    .with_context("id", id),
            );
        }
        if payload.trim().is_empty() {
            return Err(CodematchError::validation(format!(
                "{} entry '{}' has an empty '{}'",
                kind, id, field
            ))
            .with_context("position", position));
        }
    }

    Ok(())
}

pub fn validate_search_queries(queries: &[SearchQuery]) -> Result<()> {
    validate_entries(
        "search",
        "text",
        queries.iter().map(|q| (q.id.as_str(), q.text.as_str())),
    )
}

pub fn validate_reverse_queries(queries: &[ReverseSearchQuery]) -> Result<()> {
    validate_entries(
        "reverse search",
        "code",
        queries.iter().map(|q| (q.id.as_str(), q.code.as_str())),
    )
}

pub fn validate_embed_queries(queries: &[EmbedQuery]) -> Result<()> {
    validate_entries(
        "embed",
        "text",
        queries.iter().map(|q| (q.id.as_str(), q.text.as_str())),
    )
}

/// Declared metadata columns must not shadow response item fields
pub fn validate_schema(schema: &MetadataSchema) -> Result<()> {
    if let Some(column) = schema.keys().find(|c| is_reserved_column(c)) {
        return Err(CodematchError::validation(format!(
            "Metadata column '{}' clashes with a response field",
            column
        ))
        .with_context("column", column));
    }
    Ok(())
}

/// Corpus rows before any embedding: ids and texts present, declared columns
/// present in every row with a compatible type
pub fn validate_corpus(records: &[CorpusRecord], schema: &MetadataSchema) -> Result<()> {
    if records.is_empty() {
        return Err(CodematchError::validation("Corpus is empty"));
    }
    validate_schema(schema)?;

    for (row, record) in records.iter().enumerate() {
        if record.id.trim().is_empty() {
            return Err(CodematchError::validation("Corpus row has an empty 'id'")
                .with_context("row", row));
        }
        if record.text.trim().is_empty() {
            return Err(CodematchError::validation("Corpus row has an empty 'text'")
                .with_context("row", row)
                .with_context("id", &record.id));
        }

        for (column, dtype) in schema {
            let value = record.metadata.get(column).ok_or_else(|| {
                CodematchError::validation(format!("Missing metadata column '{}'", column))
                    .with_context("row", row)
                    .with_context("id", &record.id)
            })?;
            if dtype.coerce(value).is_none() {
                return Err(CodematchError::validation(format!(
                    "Metadata column '{}' expects {}, got {:?}",
                    column, dtype, value
                ))
                .with_context("row", row)
                .with_context("id", &record.id));
            }
        }
    }

    Ok(())
}

/// Evenly spaced row indices, at most `sample` of them
fn sample_rows(n_rows: usize, sample: usize) -> Vec<usize> {
    if sample == 0 || n_rows <= sample {
        return (0..n_rows).collect();
    }
    let step = n_rows as f64 / sample as f64;
    (0..sample).map(|i| ((i as f64) * step) as usize).collect()
}

/// Check `| ||row|| - 1 | < UNIT_NORM_TOLERANCE` for every row, or for an
/// evenly spaced sample when `sample` is given
pub fn validate_unit_norm(embeddings: &Array2<f32>, sample: Option<usize>) -> Result<()> {
    let n_rows = embeddings.nrows();
    let rows = match sample {
        Some(sample) => sample_rows(n_rows, sample),
        None => (0..n_rows).collect(),
    };

    for row in rows {
        let norm = l2_norm(embeddings.row(row));
        if (norm - 1.0).abs() >= UNIT_NORM_TOLERANCE {
            return Err(CodematchError::validation(format!(
                "Embedding at row {} is not unit-norm (norm {:.6})",
                row, norm
            ))
            .with_context("row", row)
            .with_context("tolerance", UNIT_NORM_TOLERANCE));
        }
    }

    Ok(())
}

/// Output contract of `search`: only requested query ids, ranks `1..=k` per
/// query without gaps, distances non-decreasing with rank
pub fn validate_search_results(queries: &[SearchQuery], results: &[SearchResult]) -> Result<()> {
    let known: HashSet<&str> = queries.iter().map(|q| q.id.as_str()).collect();
    let mut per_query: BTreeMap<&str, Vec<&SearchResult>> = BTreeMap::new();

    for result in results {
        if !known.contains(result.query_id.as_str()) {
            return Err(CodematchError::validation(format!(
                "Search result for unknown query id '{}'",
                result.query_id
            )));
        }
        if !result.distance.is_finite() || !result.similarity.is_finite() {
            return Err(CodematchError::validation("Search result has a non-finite score")
                .with_context("query_id", &result.query_id));
        }
        per_query.entry(result.query_id.as_str()).or_default().push(result);
    }

    for (query_id, mut rows) in per_query {
        rows.sort_by_key(|r| r.rank);
        for (position, row) in rows.iter().enumerate() {
            if row.rank != position + 1 {
                return Err(CodematchError::validation(format!(
                    "Ranks for query '{}' are not contiguous from 1",
                    query_id
                ))
                .with_context("query_id", query_id)
                .with_context("rank", row.rank));
            }
        }
        if rows.windows(2).any(|w| w[0].distance > w[1].distance) {
            return Err(CodematchError::validation(format!(
                "Distances for query '{}' decrease with rank",
                query_id
            ))
            .with_context("query_id", query_id));
        }
    }

    Ok(())
}

/// Output contract of `reverse_search`: only requested query ids, at most
/// `n_results` rows each
pub fn validate_reverse_results(
    queries: &[ReverseSearchQuery],
    results: &[ReverseSearchResult],
    n_results: usize,
) -> Result<()> {
    let mut counts: HashMap<&str, usize> = queries.iter().map(|q| (q.id.as_str(), 0)).collect();

    for result in results {
        let count = counts.get_mut(result.query_id.as_str()).ok_or_else(|| {
            CodematchError::validation(format!(
                "Reverse search result for unknown query id '{}'",
                result.query_id
            ))
        })?;
        *count += 1;
        if *count > n_results {
            return Err(CodematchError::validation(format!(
                "More than {} reverse search results for query '{}'",
                n_results, result.query_id
            ))
            .with_context("query_id", &result.query_id));
        }
    }

    Ok(())
}

/// Output contract of `embed`: one result per query in request order, one
/// consistent dimension
pub fn validate_embed_results(queries: &[EmbedQuery], results: &[EmbedResult]) -> Result<()> {
    if results.len() != queries.len() {
        return Err(CodematchError::validation(format!(
            "Expected {} embed results, got {}",
            queries.len(),
            results.len()
        )));
    }
    if let Some((query, result)) = queries.iter().zip(results).find(|(q, r)| q.id != r.id) {
        return Err(CodematchError::validation(format!(
            "Embed result '{}' does not match query '{}'",
            result.id, query.id
        )));
    }

    let rows: Vec<Vec<f32>> = results.iter().map(|r| r.embedding.clone()).collect();
    validate_transform_output(queries.len(), &rows)?;
    Ok(())
}

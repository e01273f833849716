//! JSON corpus reader used by the `build` command
//!
//! The file is an array of flat objects: `id` and `text` plus any number of
//! scalar metadata fields.

use codematch_common::{CodematchError, Result};
use serde_json::Value;
use std::path::Path;
use tracing::info;

use crate::types::{CorpusRecord, MetaValue, Metadata};

fn meta_value(value: &Value) -> Option<MetaValue> {
    match value {
        Value::Bool(b) => Some(MetaValue::Bool(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(MetaValue::Int)
            .or_else(|| n.as_f64().map(MetaValue::Float)),
        Value::String(s) => Some(MetaValue::Str(s.clone())),
        _ => None,
    }
}

/// Labels may be written as numbers (`1111` for `"1111"`)
fn label(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse corpus rows from JSON text
pub fn parse_corpus(data: &str) -> Result<Vec<CorpusRecord>> {
    let rows: Vec<serde_json::Map<String, Value>> = serde_json::from_str(data).map_err(|e| {
        CodematchError::validation(format!(
            "Corpus must be a JSON array of objects: {}",
            e
        ))
    })?;

    rows.into_iter()
        .enumerate()
        .map(|(row, mut fields)| {
            let id = label(fields.remove("id").as_ref()).ok_or_else(|| {
                CodematchError::validation("Corpus row needs a string 'id'").with_context("row", row)
            })?;
            let text = match fields.remove("text") {
                Some(Value::String(text)) => text,
                _ => {
                    return Err(CodematchError::validation("Corpus row needs a string 'text'")
                        .with_context("row", row)
                        .with_context("id", &id))
                }
            };

            let metadata: Metadata = fields
                .iter()
                .filter_map(|(column, value)| meta_value(value).map(|v| (column.clone(), v)))
                .collect();

            Ok(CorpusRecord { id, text, metadata })
        })
        .collect()
}

/// Read a corpus file
pub async fn read_corpus(path: &Path) -> Result<Vec<CorpusRecord>> {
    let data = tokio::fs::read_to_string(path).await.map_err(|e| {
        CodematchError::configuration(format!(
            "Cannot read corpus {}: {}",
            path.display(),
            e
        ))
        .with_context("path", path.display())
    })?;

    let records = parse_corpus(&data).map_err(|e| e.with_context("path", path.display()))?;
    info!("Read {} corpus rows from {}", records.len(), path.display());
    Ok(records)
}

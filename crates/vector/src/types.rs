use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use codematch_common::CodematchError;

/// Declared type of a metadata column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    #[serde(rename = "str")]
    Str,
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "bool")]
    Bool,
}

impl ColumnType {
    /// Name used in manifests and on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
        }
    }

    /// Convert a cell to this column type, `None` if incompatible.
    ///
    /// Integers are widened into float columns; nothing else is converted.
    pub fn coerce(&self, value: &MetaValue) -> Option<MetaValue> {
        match (self, value) {
            (Self::Str, MetaValue::Str(_))
            | (Self::Int, MetaValue::Int(_))
            | (Self::Float, MetaValue::Float(_))
            | (Self::Bool, MetaValue::Bool(_)) => Some(value.clone()),
            (Self::Float, MetaValue::Int(i)) => Some(MetaValue::Float(*i as f64)),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColumnType {
    type Err = CodematchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "str" | "string" => Ok(Self::Str),
            "int" | "integer" => Ok(Self::Int),
            "float" => Ok(Self::Float),
            "bool" | "boolean" => Ok(Self::Bool),
            other => Err(CodematchError::validation(format!(
                "Unknown metadata column type '{}', expected one of str, int, float, bool",
                other
            ))),
        }
    }
}

/// Field names of ranked and reverse-search response items. Metadata is
/// flattened next to them, so a column may not reuse one.
pub const RESERVED_COLUMNS: [&str; 5] = ["label", "description", "distance", "similarity", "rank"];

pub fn is_reserved_column(name: &str) -> bool {
    RESERVED_COLUMNS.contains(&name)
}

/// A single metadata cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Declared metadata columns: column name -> type
pub type MetadataSchema = BTreeMap<String, ColumnType>;

/// Metadata values of one row
pub type Metadata = BTreeMap<String, MetaValue>;

/// One row of the corpus a store is built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusRecord {
    /// Classification label / code, not necessarily unique
    pub id: String,

    /// Description that gets embedded
    pub text: String,

    /// Metadata columns carried through to search results
    #[serde(default)]
    pub metadata: Metadata,
}

impl CorpusRecord {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_meta(mut self, column: impl Into<String>, value: MetaValue) -> Self {
        self.metadata.insert(column.into(), value);
        self
    }
}

/// Columnar knowledge base held in memory
///
/// Row `i` of every column describes the same document. The embedding
/// matrix is `len() x dimension()`, every row unit-norm.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    pub ids: Vec<String>,
    pub texts: Vec<String>,
    pub uuids: Vec<String>,
    pub embeddings: Array2<f32>,
    pub metadata: BTreeMap<String, Vec<MetaValue>>,
}

impl KnowledgeBase {
    /// Assemble from validated corpus rows and their embeddings.
    ///
    /// Assigns a fresh v4 UUID per row and keeps only the declared metadata
    /// columns, coerced to their declared types.
    pub fn from_records(
        records: Vec<CorpusRecord>,
        embeddings: Array2<f32>,
        schema: &MetadataSchema,
    ) -> Self {
        let mut metadata: BTreeMap<String, Vec<MetaValue>> = schema
            .keys()
            .map(|column| (column.clone(), Vec::with_capacity(records.len())))
            .collect();

        let mut ids = Vec::with_capacity(records.len());
        let mut texts = Vec::with_capacity(records.len());
        let mut uuids = Vec::with_capacity(records.len());

        for record in records {
            for (column, dtype) in schema {
                let value = record
                    .metadata
                    .get(column)
                    .and_then(|v| dtype.coerce(v))
                    .unwrap_or_else(|| MetaValue::Str(String::new()));
                if let Some(values) = metadata.get_mut(column) {
                    values.push(value);
                }
            }
            ids.push(record.id);
            texts.push(record.text);
            uuids.push(uuid::Uuid::new_v4().to_string());
        }

        Self {
            ids,
            texts,
            uuids,
            embeddings,
            metadata,
        }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Embedding dimension
    pub fn dimension(&self) -> usize {
        self.embeddings.ncols()
    }

    /// Metadata values of row `row`
    pub fn row_metadata(&self, row: usize) -> Metadata {
        self.metadata
            .iter()
            .filter_map(|(column, values)| values.get(row).map(|v| (column.clone(), v.clone())))
            .collect()
    }
}

/// One query of a search request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub id: String,
    pub text: String,
}

impl SearchQuery {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// One matched document for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub query_id: String,
    pub query_text: String,

    /// Label of the matched row
    pub doc_id: String,
    pub doc_text: String,

    /// 1-based, best match first
    pub rank: usize,

    /// Cosine similarity
    pub similarity: f32,

    /// Squared euclidean distance of the unit vectors, `2 * (1 - similarity)`
    pub distance: f32,

    pub metadata: Metadata,
}

/// One code to look up by equality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseSearchQuery {
    pub id: String,
    pub code: String,
}

impl ReverseSearchQuery {
    pub fn new(id: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
        }
    }
}

/// A stored row whose id equals the looked up code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseSearchResult {
    pub query_id: String,
    pub doc_id: String,
    pub doc_text: String,
    pub metadata: Metadata,
}

/// Text to embed without searching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedQuery {
    pub id: String,
    pub text: String,
}

impl EmbedQuery {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Raw embedding keyed by the caller's id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedResult {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

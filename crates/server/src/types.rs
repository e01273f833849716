use codematch_vector::{
    DeduplicatedList, EmbedQuery, Metadata, MetadataSchema, RankedList, ReverseSearchQuery,
    SearchQuery,
};
use serde::{Deserialize, Serialize};

/// Request body shared by all endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct EntriesRequest<T> {
    pub entries: Vec<T>,
}

/// Free text to classify or embed
#[derive(Debug, Clone, Deserialize)]
pub struct DescriptionEntry {
    pub id: String,
    pub description: String,
}

impl From<DescriptionEntry> for SearchQuery {
    fn from(entry: DescriptionEntry) -> Self {
        SearchQuery::new(entry.id, entry.description)
    }
}

impl From<DescriptionEntry> for EmbedQuery {
    fn from(entry: DescriptionEntry) -> Self {
        EmbedQuery::new(entry.id, entry.description)
    }
}

/// Known label code to look up
#[derive(Debug, Clone, Deserialize)]
pub struct CodeEntry {
    pub id: String,
    pub code: String,
}

impl From<CodeEntry> for ReverseSearchQuery {
    fn from(entry: CodeEntry) -> Self {
        ReverseSearchQuery::new(entry.id, entry.code)
    }
}

fn default_search_results() -> usize {
    10
}

fn default_reverse_results() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchParams {
    #[serde(default = "default_search_results")]
    pub n_results: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReverseSearchParams {
    #[serde(default = "default_reverse_results")]
    pub n_results: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedItem {
    pub id: String,
    pub description: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedResponse {
    pub data: Vec<EmbedItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub data: Vec<RankedList>,
    pub deduplicated_data: Vec<DeduplicatedList>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReverseSearchItem {
    pub label: String,
    pub description: String,
    #[serde(flatten)]
    pub metadata: Metadata,
}

/// Matches of one looked up code; `response` is empty when the code is unknown
#[derive(Debug, Clone, Serialize)]
pub struct ReverseSearchList {
    pub input_id: String,
    pub response: Vec<ReverseSearchItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReverseSearchResponse {
    pub data: Vec<ReverseSearchList>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub endpoint: String,
    pub vectoriser_class: String,
    pub num_vectors: usize,
    pub vector_shape: usize,
    pub created_at: f64,
    pub meta_data: MetadataSchema,
    pub scoring_method: String,
    pub uptime_secs: i64,
}

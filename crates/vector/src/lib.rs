//! Codematch vector store
//!
//! 단위 정규화된 임베딩 위의 코사인 top-k 검색, 스냅샷 저장/로드, 라벨 중복 제거

pub mod corpus;
pub mod dedup;
pub mod similarity;
pub mod snapshot;
pub mod store;
pub mod types;
pub mod validation;

pub use dedup::{
    deduplicate, rank_lists, DeduplicatedCandidate, DeduplicatedList, RankedList, RankedMatch,
    ScoringMethod,
};
pub use snapshot::Manifest;
pub use store::{
    BuildOptions, EmbedHooks, ReverseSearchHooks, SearchHooks, StoreHooks, VectorStore,
    DEFAULT_BATCH_SIZE,
};
pub use types::{
    is_reserved_column, ColumnType, CorpusRecord, EmbedQuery, EmbedResult, KnowledgeBase,
    MetaValue, Metadata, MetadataSchema, ReverseSearchQuery, ReverseSearchResult, SearchQuery,
    SearchResult, RESERVED_COLUMNS,
};

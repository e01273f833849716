use codematch_common::{CodematchError, Hooks, Result};
use codematch_embed::{validate_transform_output, Vectoriser};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array2;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::similarity::search_matrix;
use crate::snapshot::{self, Manifest};
use crate::types::{
    CorpusRecord, EmbedQuery, EmbedResult, KnowledgeBase, MetadataSchema, ReverseSearchQuery,
    ReverseSearchResult, SearchQuery, SearchResult,
};
use crate::validation::{
    validate_batch_size, validate_corpus, validate_embed_queries, validate_embed_results,
    validate_n_results, validate_reverse_queries, validate_reverse_results,
    validate_search_queries, validate_search_results, validate_unit_norm, LOAD_NORM_SAMPLE,
};

pub const DEFAULT_BATCH_SIZE: usize = 8;

pub type SearchHooks = Hooks<Vec<SearchQuery>, Vec<SearchResult>>;
pub type ReverseSearchHooks = Hooks<Vec<ReverseSearchQuery>, Vec<ReverseSearchResult>>;
pub type EmbedHooks = Hooks<Vec<EmbedQuery>, Vec<EmbedResult>>;

/// Optional hooks around each public store operation
#[derive(Debug, Clone, Default)]
pub struct StoreHooks {
    pub search: SearchHooks,
    pub reverse_search: ReverseSearchHooks,
    pub embed: EmbedHooks,
}

/// Options of `VectorStore::build`
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Texts per embedding call
    pub batch_size: usize,

    /// Metadata columns copied from the corpus into the store
    pub metadata: MetadataSchema,

    /// Snapshot directory
    pub output_dir: PathBuf,

    /// Replace `output_dir` if it already exists
    pub overwrite: bool,

    /// Draw a progress bar on stderr while embedding
    pub show_progress: bool,
}

impl BuildOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            metadata: MetadataSchema::new(),
            output_dir: output_dir.into(),
            overwrite: false,
            show_progress: false,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_metadata(mut self, metadata: MetadataSchema) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }
}

/// In-memory knowledge base with brute-force cosine search
///
/// Immutable once built or loaded, so it can be shared behind an `Arc`
/// without locking.
pub struct VectorStore {
    kb: KnowledgeBase,
    manifest: Manifest,
    vectoriser: Arc<dyn Vectoriser>,
    id_index: HashMap<String, Vec<usize>>,
    embed_batch_size: usize,
    hooks: StoreHooks,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("vectoriser", &self.vectoriser.class_name())
            .field("num_vectors", &self.kb.len())
            .field("dimension", &self.kb.dimension())
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl VectorStore {
    fn from_parts(kb: KnowledgeBase, manifest: Manifest, vectoriser: Arc<dyn Vectoriser>) -> Self {
        let mut id_index: HashMap<String, Vec<usize>> = HashMap::new();
        for (row, id) in kb.ids.iter().enumerate() {
            id_index.entry(id.clone()).or_default().push(row);
        }

        Self {
            kb,
            manifest,
            vectoriser,
            id_index,
            embed_batch_size: DEFAULT_BATCH_SIZE,
            hooks: StoreHooks::default(),
        }
    }

    /// Embed a corpus, persist it as a snapshot and return the ready store
    pub async fn build(
        corpus: Vec<CorpusRecord>,
        vectoriser: Arc<dyn Vectoriser>,
        options: BuildOptions,
    ) -> Result<Self> {
        validate_batch_size(options.batch_size)?;
        validate_corpus(&corpus, &options.metadata)?;
        snapshot::check_output_dir(&options.output_dir, options.overwrite)?;

        info!(
            "Building vector store: {} rows, batch size {}, provider {}",
            corpus.len(),
            options.batch_size,
            vectoriser.class_name()
        );

        let texts: Vec<String> = corpus.iter().map(|r| r.text.clone()).collect();
        let progress = progress_bar(texts.len(), options.show_progress);

        let mut rows: Vec<f32> = Vec::new();
        let mut dimension = 0;
        for (batch_index, batch) in texts.chunks(options.batch_size).enumerate() {
            let embeddings =
                embed_batch(vectoriser.as_ref(), batch, batch_index, options.batch_size).await?;
            if batch_index == 0 {
                dimension = embeddings.ncols();
            } else if embeddings.ncols() != dimension {
                return Err(dimension_mismatch(dimension, embeddings.ncols())
                    .with_context("batch_index", batch_index));
            }
            rows.extend(embeddings.iter());
            progress.inc(batch.len() as u64);
        }
        progress.finish_and_clear();

        let embeddings = Array2::from_shape_vec((texts.len(), dimension), rows)
            .map_err(|e| CodematchError::vectorisation(format!("Bad embedding shape: {}", e)))?;
        validate_unit_norm(&embeddings, None)
            .map_err(|e| e.with_context("provider", vectoriser.class_name()))?;

        let kb = KnowledgeBase::from_records(corpus, embeddings, &options.metadata);
        let manifest = Manifest::new(vectoriser.class_name(), &kb, &options.metadata);
        let manifest = snapshot::write_snapshot(&options.output_dir, &kb, manifest).await?;

        info!(
            "Vector store built: {} vectors of dimension {}",
            kb.len(),
            kb.dimension()
        );
        Ok(Self::from_parts(kb, manifest, vectoriser))
    }

    /// Load a snapshot written by `build`
    pub async fn load(dir: impl AsRef<Path>, vectoriser: Arc<dyn Vectoriser>) -> Result<Self> {
        let dir = dir.as_ref();
        let manifest = snapshot::read_manifest(dir).await?;

        if manifest.vectoriser_class != vectoriser.class_name() {
            return Err(CodematchError::configuration(format!(
                "Vectoriser class in metadata ({}) does not match provided vectoriser ({})",
                manifest.vectoriser_class,
                vectoriser.class_name()
            ))
            .with_context("snapshot_dir", dir.display()));
        }

        let kb = snapshot::read_table(dir, &manifest).await?;
        validate_unit_norm(&kb.embeddings, Some(LOAD_NORM_SAMPLE)).map_err(|e| {
            CodematchError::index_build(format!("Snapshot failed the unit-norm check: {}", e))
                .with_context("snapshot_dir", dir.display())
        })?;

        info!(
            "Vector store loaded from {} - {} vectors of dimension {}",
            dir.display(),
            kb.len(),
            kb.dimension()
        );
        Ok(Self::from_parts(kb, manifest, vectoriser))
    }

    /// Install operation hooks
    pub fn with_hooks(mut self, hooks: StoreHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Batch size used by `embed`
    pub fn with_embed_batch_size(mut self, batch_size: usize) -> Result<Self> {
        validate_batch_size(batch_size)?;
        self.embed_batch_size = batch_size;
        Ok(self)
    }

    /// Top `n_results` rows per query, ordered by query then rank.
    ///
    /// `n_results` beyond the number of stored rows is clamped.
    pub async fn search(
        &self,
        queries: &[SearchQuery],
        n_results: usize,
        batch_size: usize,
    ) -> Result<Vec<SearchResult>> {
        validate_n_results(n_results)?;
        validate_batch_size(batch_size)?;
        validate_search_queries(queries)?;

        let hooks = &self.hooks.search;
        let queries = hooks.run_pre("search", queries.to_vec())?;
        if hooks.has_pre() {
            validate_search_queries(&queries).map_err(hook_contract("search", "pre"))?;
        }

        let k = n_results.min(self.kb.len());
        if k < n_results {
            debug!("n_results {} exceeds store size, clamped to {}", n_results, k);
        }

        let mut results = Vec::with_capacity(queries.len() * k);
        for (batch_index, batch) in queries.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|q| q.text.clone()).collect();
            let embeddings =
                embed_batch(self.vectoriser.as_ref(), &texts, batch_index, batch_size).await?;
            if embeddings.ncols() != self.kb.dimension() {
                return Err(dimension_mismatch(self.kb.dimension(), embeddings.ncols())
                    .with_context("batch_index", batch_index));
            }

            let neighbours = search_matrix(embeddings.view(), self.kb.embeddings.view(), k);
            for (query, row) in batch.iter().zip(neighbours) {
                for (position, neighbour) in row.into_iter().enumerate() {
                    results.push(SearchResult {
                        query_id: query.id.clone(),
                        query_text: query.text.clone(),
                        doc_id: self.kb.ids[neighbour.index].clone(),
                        doc_text: self.kb.texts[neighbour.index].clone(),
                        rank: position + 1,
                        similarity: neighbour.similarity,
                        distance: neighbour.distance(),
                        metadata: self.kb.row_metadata(neighbour.index),
                    });
                }
            }
            debug!("Search batch {} done ({} queries)", batch_index, batch.len());
        }

        let results = hooks.run_post("search", results)?;
        if hooks.has_post() {
            validate_search_results(&queries, &results).map_err(hook_contract("search", "post"))?;
        }

        info!(
            "Search completed - {} queries, {} results",
            queries.len(),
            results.len()
        );
        Ok(results)
    }

    /// Stored rows whose `id` equals each query's code, at most `n_results`
    /// per query in store order. Queries without a match contribute nothing.
    pub fn reverse_search(
        &self,
        queries: &[ReverseSearchQuery],
        n_results: usize,
    ) -> Result<Vec<ReverseSearchResult>> {
        validate_n_results(n_results)?;
        validate_reverse_queries(queries)?;

        let hooks = &self.hooks.reverse_search;
        let queries = hooks.run_pre("reverse_search", queries.to_vec())?;
        if hooks.has_pre() {
            validate_reverse_queries(&queries).map_err(hook_contract("reverse_search", "pre"))?;
        }

        let mut results = Vec::new();
        for query in &queries {
            let rows = self.id_index.get(&query.code).map(Vec::as_slice).unwrap_or(&[]);
            for &row in rows.iter().take(n_results) {
                results.push(ReverseSearchResult {
                    query_id: query.id.clone(),
                    doc_id: self.kb.ids[row].clone(),
                    doc_text: self.kb.texts[row].clone(),
                    metadata: self.kb.row_metadata(row),
                });
            }
        }

        let results = hooks.run_post("reverse_search", results)?;
        if hooks.has_post() {
            validate_reverse_results(&queries, &results, n_results)
                .map_err(hook_contract("reverse_search", "post"))?;
        }

        debug!(
            "Reverse search completed - {} queries, {} rows",
            queries.len(),
            results.len()
        );
        Ok(results)
    }

    /// Raw provider embeddings keyed by the caller's ids
    pub async fn embed(&self, queries: &[EmbedQuery]) -> Result<Vec<EmbedResult>> {
        validate_embed_queries(queries)?;

        let hooks = &self.hooks.embed;
        let queries = hooks.run_pre("embed", queries.to_vec())?;
        if hooks.has_pre() {
            validate_embed_queries(&queries).map_err(hook_contract("embed", "pre"))?;
        }

        let mut results = Vec::with_capacity(queries.len());
        for (batch_index, batch) in queries.chunks(self.embed_batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|q| q.text.clone()).collect();
            let embeddings = embed_batch(
                self.vectoriser.as_ref(),
                &texts,
                batch_index,
                self.embed_batch_size,
            )
            .await?;

            for (query, row) in batch.iter().zip(embeddings.rows()) {
                results.push(EmbedResult {
                    id: query.id.clone(),
                    text: query.text.clone(),
                    embedding: row.to_vec(),
                });
            }
        }

        let results = hooks.run_post("embed", results)?;
        if hooks.has_post() {
            validate_embed_results(&queries, &results).map_err(hook_contract("embed", "post"))?;
        }

        debug!("Embedded {} texts", results.len());
        Ok(results)
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.kb.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kb.is_empty()
    }

    /// Embedding dimension
    pub fn dimension(&self) -> usize {
        self.kb.dimension()
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn metadata_schema(&self) -> &MetadataSchema {
        &self.manifest.meta_data
    }

    pub fn vectoriser_class(&self) -> &str {
        &self.manifest.vectoriser_class
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }
}

/// Embed one batch, keeping the error kind and recording where it failed
async fn embed_batch(
    vectoriser: &dyn Vectoriser,
    texts: &[String],
    batch_index: usize,
    batch_size: usize,
) -> Result<Array2<f32>> {
    let with_batch = |e: CodematchError| {
        e.classify_with(CodematchError::vectorisation)
            .with_context("batch_index", batch_index)
            .with_context("batch_size", batch_size)
            .with_context("provider", vectoriser.class_name())
    };

    let rows = vectoriser.transform(texts).await.map_err(with_batch)?;
    let dimension = validate_transform_output(texts.len(), &rows).map_err(with_batch)?;

    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((texts.len(), dimension), flat).map_err(|e| {
        with_batch(CodematchError::vectorisation(format!(
            "Bad embedding shape: {}",
            e
        )))
    })
}

fn dimension_mismatch(expected: usize, actual: usize) -> CodematchError {
    CodematchError::vectorisation(format!(
        "Embedding dimension {} does not match expected {}",
        actual, expected
    ))
    .with_context("expected_dim", expected)
    .with_context("actual_dim", actual)
}

/// Contract violation by a hook's output becomes a hook error
fn hook_contract(
    operation: &'static str,
    stage: &'static str,
) -> impl Fn(CodematchError) -> CodematchError {
    move |e| {
        CodematchError::hook(format!(
            "{} hook for '{}' broke the operation contract: {}",
            stage, operation, e
        ))
        .with_context("operation", operation)
        .with_context("stage", stage)
    }
}

fn progress_bar(total: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

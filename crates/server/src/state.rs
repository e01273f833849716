use chrono::{DateTime, Utc};
use codematch_common::{AppConfig, Result};
use codematch_vector::{ScoringMethod, VectorStore};
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Loaded store, read-only for the lifetime of the server
    pub store: Arc<VectorStore>,

    /// Label group scoring used for `deduplicated_data`
    pub scoring: ScoringMethod,

    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: AppConfig, store: Arc<VectorStore>) -> Result<Self> {
        let scoring = config.scoring_method.parse()?;

        Ok(Self {
            config,
            store,
            scoring,
            started_at: Utc::now(),
        })
    }
}

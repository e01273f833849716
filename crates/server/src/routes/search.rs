use actix_web::{post, web, HttpResponse};
use codematch_common::CodematchError;
use codematch_vector::{deduplicate, rank_lists, SearchQuery};
use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;
use crate::types::{DescriptionEntry, EntriesRequest, SearchParams, SearchResponse};

/// Ranked matches per entry plus the label-deduplicated view
#[post("/search")]
pub async fn search(
    params: web::Query<SearchParams>,
    req: web::Json<EntriesRequest<DescriptionEntry>>,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse, ApiError> {
    let queries: Vec<SearchQuery> = req.into_inner().entries.into_iter().map(Into::into).collect();
    info!(
        "Search request: {} entries, n_results={}",
        queries.len(),
        params.n_results
    );

    let results = state
        .store
        .search(&queries, params.n_results, state.config.search_batch_size)
        .await?;

    let data = rank_lists(&queries, &results);
    if let Some(empty) = data.iter().find(|list| list.response.is_empty()) {
        return Err(CodematchError::empty_response(empty.input_id.as_str()).into());
    }
    let deduplicated_data = deduplicate(&data, state.scoring);

    Ok(HttpResponse::Ok().json(SearchResponse {
        data,
        deduplicated_data,
    }))
}

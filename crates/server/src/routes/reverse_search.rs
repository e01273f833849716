use actix_web::{post, web, HttpResponse};
use codematch_vector::ReverseSearchQuery;
use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;
use crate::types::{
    CodeEntry, EntriesRequest, ReverseSearchItem, ReverseSearchList, ReverseSearchParams,
    ReverseSearchResponse,
};

/// Stored rows per known code; unknown codes get an empty list
#[post("/reverse_search")]
pub async fn reverse_search(
    params: web::Query<ReverseSearchParams>,
    req: web::Json<EntriesRequest<CodeEntry>>,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse, ApiError> {
    let queries: Vec<ReverseSearchQuery> =
        req.into_inner().entries.into_iter().map(Into::into).collect();
    info!(
        "Reverse search request: {} entries, n_results={}",
        queries.len(),
        params.n_results
    );

    let results = state.store.reverse_search(&queries, params.n_results)?;

    let data = queries
        .iter()
        .map(|query| ReverseSearchList {
            input_id: query.id.clone(),
            response: results
                .iter()
                .filter(|r| r.query_id == query.id)
                .map(|r| ReverseSearchItem {
                    label: r.doc_id.clone(),
                    description: r.doc_text.clone(),
                    metadata: r.metadata.clone(),
                })
                .collect(),
        })
        .collect();

    Ok(HttpResponse::Ok().json(ReverseSearchResponse { data }))
}

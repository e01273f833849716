use actix_web::{post, web, HttpResponse};
use codematch_vector::EmbedQuery;
use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;
use crate::types::{DescriptionEntry, EmbedItem, EmbedResponse, EntriesRequest};

/// Raw embeddings of the given descriptions
#[post("/embed")]
pub async fn embed(
    req: web::Json<EntriesRequest<DescriptionEntry>>,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse, ApiError> {
    let queries: Vec<EmbedQuery> = req.into_inner().entries.into_iter().map(Into::into).collect();
    info!("Embed request: {} entries", queries.len());

    let data = state
        .store
        .embed(&queries)
        .await?
        .into_iter()
        .map(|r| EmbedItem {
            id: r.id,
            description: r.text,
            embedding: r.embedding,
        })
        .collect();

    Ok(HttpResponse::Ok().json(EmbedResponse { data }))
}

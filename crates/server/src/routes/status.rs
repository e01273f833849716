use actix_web::{get, web, HttpResponse};
use chrono::Utc;
use std::sync::Arc;

use crate::state::AppState;
use crate::types::StatusResponse;

/// Store statistics
#[get("/status")]
pub async fn status(state: web::Data<Arc<AppState>>) -> actix_web::Result<HttpResponse> {
    let manifest = state.store.manifest();

    Ok(HttpResponse::Ok().json(StatusResponse {
        status: "ok",
        endpoint: state.config.endpoint_segment().to_string(),
        vectoriser_class: manifest.vectoriser_class.clone(),
        num_vectors: state.store.len(),
        vector_shape: state.store.dimension(),
        created_at: manifest.created_at,
        meta_data: manifest.meta_data.clone(),
        scoring_method: state.scoring.to_string(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    }))
}

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::{web, Error};
use std::sync::Arc;
use tracing::Span;
use tracing_actix_web::{root_span, DefaultRootSpanBuilder, RootSpanBuilder};

use crate::state::AppState;

/// Request span carrying the mounted endpoint and the store's provider, so
/// every log line of a request says which store served it
pub struct StoreRootSpan;

impl RootSpanBuilder for StoreRootSpan {
    fn on_request_start(request: &ServiceRequest) -> Span {
        let (endpoint, vectoriser) = store_fields(request);
        root_span!(request, endpoint = %endpoint, vectoriser = %vectoriser)
    }

    fn on_request_end<B: MessageBody>(span: Span, outcome: &Result<ServiceResponse<B>, Error>) {
        DefaultRootSpanBuilder::on_request_end(span, outcome);
    }
}

/// `(endpoint, vectoriser)` of the app serving `request`, `-` when unknown
fn store_fields(request: &ServiceRequest) -> (String, String) {
    match request.app_data::<web::Data<Arc<AppState>>>() {
        Some(state) => (
            state.config.endpoint_segment().to_string(),
            state.store.vectoriser_class().to_string(),
        ),
        None => ("-".to_string(), "-".to_string()),
    }
}

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use codematch_common::CodematchError;
use std::fmt;
use tracing::{error, warn};

/// Taxonomy error rendered as `{error, detail, context}` with its mapped status
#[derive(Debug)]
pub struct ApiError(pub CodematchError);

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<CodematchError> for ApiError {
    fn from(err: CodematchError) -> Self {
        Self(err)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed ({}): {}", self.0.code(), self.0);
        } else {
            warn!("Request rejected ({}): {}", self.0.code(), self.0);
        }

        HttpResponse::build(status).json(self.0.to_body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn test_error_body_and_status() {
        let err = ApiError::from(
            CodematchError::validation("'ids' must contain unique values.").with_context("id", "7"),
        );
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "validation_error");
        assert_eq!(json["detail"], "'ids' must contain unique values.");
        assert_eq!(json["context"]["id"], "7");
    }

    #[test]
    fn test_status_mapping() {
        let unavailable = ApiError::from(CodematchError::external_service("down"));
        assert_eq!(unavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let empty = ApiError::from(CodematchError::empty_response("q1"));
        assert_eq!(empty.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

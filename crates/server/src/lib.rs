//! Codematch HTTP Server
//!
//! Actix-web 기반 REST API: embed, search, reverse_search, status

pub mod error;
pub mod routes;
pub mod span;
pub mod state;
pub mod types;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use codematch_common::{AppConfig, CodematchError, Result};
use codematch_vector::VectorStore;
use std::sync::Arc;
use tracing::info;
use tracing_actix_web::TracingLogger;

pub use error::ApiError;
pub use span::StoreRootSpan;
pub use state::AppState;

/// Register all routes, the store operations under `/{endpoint_name}`.
///
/// Surrounding slashes in `endpoint_name` are ignored.
pub fn configure(cfg: &mut web::ServiceConfig, endpoint_name: &str) {
    let scope = format!("/{}", endpoint_name.trim().trim_matches('/'));
    let json_config = web::JsonConfig::default().error_handler(|err, _req| {
        ApiError::from(CodematchError::validation(format!("Invalid request body: {}", err))).into()
    });
    let query_config = web::QueryConfig::default().error_handler(|err, _req| {
        ApiError::from(CodematchError::validation(format!("Invalid query string: {}", err))).into()
    });

    cfg.app_data(json_config)
        .app_data(query_config)
        .service(routes::status::status)
        .service(
            web::scope(&scope)
                .service(routes::embed::embed)
                .service(routes::search::search)
                .service(routes::reverse_search::reverse_search),
        );
}

/// Serve `store` until the process is stopped
pub async fn start_server(config: AppConfig, store: Arc<VectorStore>) -> Result<()> {
    let bind_addr = config.server_bind_address();
    let endpoint_name = config.endpoint_segment().to_string();
    let state = Arc::new(AppState::new(config, store)?);

    info!(
        "Starting server on {} - endpoint /{}, {} vectors, scoring {}",
        bind_addr,
        endpoint_name,
        state.store.len(),
        state.scoring
    );

    HttpServer::new(move || {
        let endpoint_name = endpoint_name.clone();
        App::new()
            .wrap(Cors::permissive())
            .wrap(TracingLogger::<StoreRootSpan>::new())
            .app_data(web::Data::new(state.clone()))
            .configure(move |cfg| configure(cfg, &endpoint_name))
    })
    .bind(&bind_addr)
    .map_err(|e| {
        CodematchError::configuration(format!("Failed to bind {}: {}", bind_addr, e))
            .with_context("bind_addr", &bind_addr)
    })?
    .run()
    .await?;

    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test};
    use async_trait::async_trait;
    use codematch_embed::Vectoriser;
    use codematch_vector::{
        BuildOptions, ColumnType, CorpusRecord, MetaValue, MetadataSchema, SearchHooks,
        SearchResult, StoreHooks,
    };
    use serde_json::{json, Value};

    /// One-hot vector on the axis picked by the first byte
    struct AxisVectoriser;

    #[async_trait]
    impl Vectoriser for AxisVectoriser {
        fn class_name(&self) -> &str {
            "AxisVectoriser"
        }

        async fn transform(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut row = vec![0.0; 4];
                    row[(t.as_bytes()[0] as usize) % 4] = 1.0;
                    row
                })
                .collect())
        }
    }

    async fn store(dir: &std::path::Path) -> VectorStore {
        let mut schema = MetadataSchema::new();
        schema.insert("group".to_string(), ColumnType::Str);
        let corpus = vec![
            // 'a' -> axis 1, 'b' -> 2, 'c' -> 3, 'd' -> 0
            CorpusRecord::new("1111", "accountant").with_meta("group", MetaValue::Str("A".into())),
            CorpusRecord::new("1111", "auditor").with_meta("group", MetaValue::Str("A".into())),
            CorpusRecord::new("2222", "baker").with_meta("group", MetaValue::Str("B".into())),
            CorpusRecord::new("3333", "cook").with_meta("group", MetaValue::Str("C".into())),
            CorpusRecord::new("4444", "driver").with_meta("group", MetaValue::Str("D".into())),
        ];
        let options = BuildOptions::new(dir.join("store")).with_metadata(schema);
        VectorStore::build(corpus, Arc::new(AxisVectoriser), options)
            .await
            .unwrap()
    }

    fn state(store: VectorStore) -> web::Data<Arc<AppState>> {
        let state = AppState::new(AppConfig::default(), Arc::new(store)).unwrap();
        web::Data::new(Arc::new(state))
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data($state)
                    .configure(|cfg| configure(cfg, "soc")),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_endpoint_name_with_slashes_is_mounted() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.endpoint_name = "/soc/".to_string();
        assert!(config.validate().is_ok());

        let state = web::Data::new(Arc::new(
            AppState::new(config.clone(), Arc::new(store(tmp.path()).await)).unwrap(),
        ));
        let app = test::init_service(
            App::new()
                .app_data(state)
                .configure(|cfg| configure(cfg, &config.endpoint_name)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/soc/embed")
            .set_json(json!({"rows": []}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "validation_error");

        let req = test::TestRequest::get().uri("/status").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["endpoint"], "soc");
    }

    #[actix_web::test]
    async fn test_request_span_wraps_store_routes() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .wrap(TracingLogger::<StoreRootSpan>::new())
                .app_data(state(store(tmp.path()).await))
                .configure(|cfg| configure(cfg, "soc")),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/soc/reverse_search")
            .set_json(json!({"entries": [{"id": "a", "code": "2222"}]}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"][0]["response"][0]["description"], "baker");
    }

    #[actix_web::test]
    async fn test_search_returns_raw_and_deduplicated() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app!(state(store(tmp.path()).await));

        let req = test::TestRequest::post()
            .uri("/soc/search?n_results=3")
            .set_json(json!({"entries": [{"id": "q1", "description": "analyst"}]}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        let data = &body["data"][0];
        assert_eq!(data["input_id"], "q1");
        assert_eq!(data["response"].as_array().unwrap().len(), 3);
        assert_eq!(data["response"][0]["label"], "1111");
        assert_eq!(data["response"][0]["rank"], 1);
        assert_eq!(data["response"][0]["group"], "A");

        let dedup = &body["deduplicated_data"][0]["response"];
        let labels: Vec<&str> = dedup
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["label"].as_str().unwrap())
            .collect();
        assert_eq!(labels[0], "1111");
        assert_eq!(labels.iter().filter(|l| **l == "1111").count(), 1);
        assert!(dedup[0]["score"].is_string());
    }

    #[actix_web::test]
    async fn test_search_defaults_to_ten_results_clamped() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app!(state(store(tmp.path()).await));

        let req = test::TestRequest::post()
            .uri("/soc/search")
            .set_json(json!({"entries": [{"id": "q1", "description": "baking"}]}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"][0]["response"].as_array().unwrap().len(), 5);
    }

    #[actix_web::test]
    async fn test_duplicate_ids_are_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app!(state(store(tmp.path()).await));

        let req = test::TestRequest::post()
            .uri("/soc/search")
            .set_json(json!({"entries": [
                {"id": "1", "description": "baker"},
                {"id": "1", "description": "cook"}
            ]}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "validation_error");
    }

    #[actix_web::test]
    async fn test_malformed_body_is_structured_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app!(state(store(tmp.path()).await));

        let req = test::TestRequest::post()
            .uri("/soc/search?n_results=0")
            .set_json(json!({"entries": [{"id": "1", "description": "baker"}]}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/soc/embed")
            .set_json(json!({"rows": []}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "validation_error");
    }

    #[actix_web::test]
    async fn test_empty_ranked_list_is_server_fault() {
        let tmp = tempfile::tempdir().unwrap();
        let hooks = StoreHooks {
            search: SearchHooks::new().with_post(|results: Vec<SearchResult>| {
                Ok(results.into_iter().filter(|r| r.query_id != "q2").collect())
            }),
            ..StoreHooks::default()
        };
        let store = store(tmp.path()).await.with_hooks(hooks);
        let app = app!(state(store));

        let req = test::TestRequest::post()
            .uri("/soc/search")
            .set_json(json!({"entries": [
                {"id": "q1", "description": "baker"},
                {"id": "q2", "description": "cook"}
            ]}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "empty_response");
    }

    #[actix_web::test]
    async fn test_reverse_search_lists_every_input() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app!(state(store(tmp.path()).await));

        let req = test::TestRequest::post()
            .uri("/soc/reverse_search")
            .set_json(json!({"entries": [
                {"id": "a", "code": "1111"},
                {"id": "b", "code": "9999"}
            ]}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["response"].as_array().unwrap().len(), 2);
        assert_eq!(data[0]["response"][0]["description"], "accountant");
        assert_eq!(data[0]["response"][0]["group"], "A");
        assert_eq!(data[1]["input_id"], "b");
        assert!(data[1]["response"].as_array().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_embed_and_status() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app!(state(store(tmp.path()).await));

        let req = test::TestRequest::post()
            .uri("/soc/embed")
            .set_json(json!({"entries": [{"id": "x", "description": "cook"}]}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"][0]["id"], "x");
        assert_eq!(body["data"][0]["description"], "cook");
        assert_eq!(body["data"][0]["embedding"], json!([0.0, 0.0, 0.0, 1.0]));

        let req = test::TestRequest::get().uri("/status").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["vectoriser_class"], "AxisVectoriser");
        assert_eq!(body["num_vectors"], 5);
        assert_eq!(body["vector_shape"], 4);
        assert_eq!(body["meta_data"]["group"], "str");
        assert_eq!(body["scoring_method"], "naive");
    }
}

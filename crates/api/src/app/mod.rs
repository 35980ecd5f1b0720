//! HTTP API application wiring (Axum router + engine wiring).
//!
//! - `services.rs`: store selection and the blocking-call bridge
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use axum::{routing::get, Extension, Router};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::SharedEngine;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(engine: SharedEngine) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(Extension(engine))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use indexq_core::Operation;
    use indexq_infra::jobs::QueueEngine;
    use indexq_infra::list_store::{InMemoryListStore, ListStore};

    fn engine() -> SharedEngine {
        let store: Arc<dyn ListStore> = InMemoryListStore::arc();
        Arc::new(QueueEngine::new(store, "test"))
    }

    async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let res = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, _) = call(build_app(engine()), "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn stats_reflect_enqueued_jobs() {
        let engine = engine();
        engine
            .enqueue("listings", Operation::Insert, serde_json::json!({"id": 1}))
            .unwrap();

        let (status, body) = call(build_app(engine), "GET", "/queue/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pending"], 1);
        assert_eq!(body["total"], 1);
    }

    #[tokio::test]
    async fn clearing_unknown_queue_is_bad_request() {
        let (status, body) = call(build_app(engine()), "DELETE", "/queue/archive").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_queue_type");
    }

    #[tokio::test]
    async fn clearing_completed_reports_removed_count() {
        let engine = engine();
        let id = engine
            .enqueue("listings", Operation::Insert, serde_json::json!({}))
            .unwrap();
        engine.dequeue(std::time::Duration::ZERO).unwrap();
        engine.complete(&id).unwrap();

        let (status, body) = call(build_app(engine), "DELETE", "/queue/completed").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["queue"], "completed");
        assert_eq!(body["removed"], 1);
    }
}

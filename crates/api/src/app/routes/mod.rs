use axum::Router;

pub mod queue;
pub mod system;

/// Router for the queue admin endpoints.
pub fn router() -> Router {
    Router::new().nest("/queue", queue::router())
}

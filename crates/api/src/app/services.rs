//! Engine wiring and the async → blocking bridge.

use std::sync::Arc;

use axum::http::StatusCode;
use tracing::{info, warn};

use indexq_infra::jobs::{QueueConfig, QueueEngine, QueueError};
use indexq_infra::list_store::{InMemoryListStore, ListStore};

use crate::app::errors;

/// Engine shared by the admin routes and the consumer loop.
pub type SharedEngine = Arc<QueueEngine<Arc<dyn ListStore>>>;

/// Build the engine for `config`: Redis when a URL is configured, otherwise an
/// in-memory store (dev only; nothing survives a restart).
pub fn build_engine(config: &QueueConfig) -> Result<SharedEngine, QueueError> {
    let store: Arc<dyn ListStore> = match config.redis_url.as_deref() {
        Some(url) => redis_store(url)?,
        None => {
            warn!("REDIS_URL not set; using in-memory queue store (jobs are lost on restart)");
            InMemoryListStore::arc()
        }
    };

    info!(queue = %config.queue_name, "queue engine ready");
    Ok(Arc::new(QueueEngine::new(store, config.queue_name.clone())))
}

#[cfg(feature = "redis")]
fn redis_store(url: &str) -> Result<Arc<dyn ListStore>, QueueError> {
    let store = indexq_infra::list_store::RedisListStore::new(url)?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
fn redis_store(_url: &str) -> Result<Arc<dyn ListStore>, QueueError> {
    Err(QueueError::Connection(
        "built without the `redis` feature".to_string(),
    ))
}

/// Run an engine call on the blocking pool and map its error to a response.
pub async fn run_blocking<T, F>(engine: &SharedEngine, op: F) -> Result<T, axum::response::Response>
where
    T: Send + 'static,
    F: FnOnce(&QueueEngine<Arc<dyn ListStore>>) -> Result<T, QueueError> + Send + 'static,
{
    let engine = engine.clone();
    tokio::task::spawn_blocking(move || op(&engine))
        .await
        .map_err(|e| errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "task_failed", e.to_string()))?
        .map_err(errors::queue_error_to_response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_in_memory_without_redis_url() {
        let engine = build_engine(&QueueConfig::default().with_queue_name("dev")).unwrap();
        assert!(engine.test_connection());
        assert_eq!(engine.names().name(), "dev");
    }
}

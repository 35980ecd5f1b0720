//! Queue statistics and administrative routes.
//!
//! Clearing pending or processing discards live work; these endpoints are
//! meant for operators behind the platform gateway.

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};

use indexq_core::{Operation, QueueKind};
use indexq_infra::jobs::QueueError;

use crate::app::dto::{
    ClearResponse, ConnectionResponse, EnqueueRequest, EnqueueResponse, ListJobsQuery,
    RequeueResponse,
};
use crate::app::errors;
use crate::app::services::{run_blocking, SharedEngine};

pub fn router() -> Router {
    Router::new()
        .route("/stats", get(stats))
        .route("/connection", get(connection))
        .route("/jobs", post(enqueue))
        .route("/failed/retry", post(retry_failed))
        .route("/processing/requeue", post(requeue_processing))
        .route("/:kind", delete(clear))
        .route("/:kind/jobs", get(list_jobs))
}

fn parse_kind(raw: &str) -> Result<QueueKind, axum::response::Response> {
    raw.parse::<QueueKind>()
        .map_err(|e| errors::queue_error_to_response(QueueError::from(e)))
}

async fn stats(Extension(engine): Extension<SharedEngine>) -> impl IntoResponse {
    match run_blocking(&engine, |e| e.get_stats()).await {
        Ok(stats) => Json(stats).into_response(),
        Err(resp) => resp,
    }
}

async fn connection(Extension(engine): Extension<SharedEngine>) -> impl IntoResponse {
    match run_blocking(&engine, |e| Ok(e.test_connection())).await {
        Ok(connected) => Json(ConnectionResponse { connected }).into_response(),
        Err(resp) => resp,
    }
}

async fn enqueue(
    Extension(engine): Extension<SharedEngine>,
    Json(req): Json<EnqueueRequest>,
) -> impl IntoResponse {
    let operation = match req.operation.parse::<Operation>() {
        Ok(op) => op,
        Err(e) => return errors::queue_error_to_response(QueueError::from(e)),
    };

    match run_blocking(&engine, move |e| e.enqueue(&req.table, operation, req.data)).await {
        Ok(id) => (StatusCode::CREATED, Json(EnqueueResponse { id })).into_response(),
        Err(resp) => resp,
    }
}

async fn list_jobs(
    Extension(engine): Extension<SharedEngine>,
    Path(kind): Path<String>,
    Query(query): Query<ListJobsQuery>,
) -> impl IntoResponse {
    let kind = match parse_kind(&kind) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let limit = query.limit();

    match run_blocking(&engine, move |e| e.list_jobs(kind, limit)).await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(resp) => resp,
    }
}

async fn clear(
    Extension(engine): Extension<SharedEngine>,
    Path(kind): Path<String>,
) -> impl IntoResponse {
    let kind = match parse_kind(&kind) {
        Ok(k) => k,
        Err(resp) => return resp,
    };

    match run_blocking(&engine, move |e| e.clear_queue(kind)).await {
        Ok(removed) => Json(ClearResponse { queue: kind, removed }).into_response(),
        Err(resp) => resp,
    }
}

/// Replays dead-lettered jobs. Records that cannot be parsed stay in `failed`,
/// so `requeued` may be lower than the failed count read beforehand.
async fn retry_failed(Extension(engine): Extension<SharedEngine>) -> impl IntoResponse {
    match run_blocking(&engine, |e| e.retry_failed_jobs()).await {
        Ok(requeued) => Json(RequeueResponse { requeued }).into_response(),
        Err(resp) => resp,
    }
}

/// Jobs a live consumer is holding get delivered twice; the binary already
/// runs this recovery once before its consumer starts.
async fn requeue_processing(Extension(engine): Extension<SharedEngine>) -> impl IntoResponse {
    match run_blocking(&engine, |e| e.requeue_processing()).await {
        Ok(requeued) => Json(RequeueResponse { requeued }).into_response(),
        Err(resp) => resp,
    }
}

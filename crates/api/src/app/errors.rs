use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use indexq_infra::jobs::QueueError;

pub fn queue_error_to_response(err: QueueError) -> axum::response::Response {
    match err {
        QueueError::InvalidQueueType(name) => json_error(
            StatusCode::BAD_REQUEST,
            "invalid_queue_type",
            format!("{name} (expected pending, processing, completed or failed)"),
        ),
        QueueError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        QueueError::Connection(msg) => json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", msg),
        QueueError::Store(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg),
        QueueError::Serialization(msg) | QueueError::Deserialization(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "record_error", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use tenantnotes_core::DomainError;
use tenantnotes_infra::NoteServiceError;

pub fn note_error_to_response(err: NoteServiceError) -> axum::response::Response {
    match err {
        NoteServiceError::Domain(DomainError::Validation(msg)) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        NoteServiceError::Domain(DomainError::InvalidId(msg)) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        NoteServiceError::NotFound => {
            json_error(StatusCode::NOT_FOUND, "not_found", "note not found")
        }
        NoteServiceError::Store(e) => {
            error!(error = %e, "note store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "note store unavailable")
        }
    }
}

pub fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

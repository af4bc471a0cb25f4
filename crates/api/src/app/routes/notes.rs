use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use tenantnotes_core::NoteId;

use crate::app::dto::{CreateNoteRequest, NoteListResponse, NoteResponse};
use crate::app::errors::{json_error, json_rejection_to_response, note_error_to_response};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub async fn create_note(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<CreateNoteRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return json_rejection_to_response(rejection),
    };

    match services
        .notes
        .create_note(tenant.organization_id(), principal.user_id(), &req.title, &req.content)
        .await
    {
        Ok(note) => (StatusCode::CREATED, Json(NoteResponse { data: note })).into_response(),
        Err(e) => note_error_to_response(e),
    }
}

pub async fn list_notes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    match services.notes.list_notes(tenant.organization_id()).await {
        Ok(data) => Json(NoteListResponse { data }).into_response(),
        Err(e) => note_error_to_response(e),
    }
}

pub async fn get_note(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: NoteId = match id.parse() {
        Ok(id) => id,
        Err(_) => return json_error(StatusCode::BAD_REQUEST, "invalid_id", "note id must be a positive integer"),
    };

    match services.notes.get_note(tenant.organization_id(), id).await {
        Ok(note) => Json(NoteResponse { data: note }).into_response(),
        Err(e) => note_error_to_response(e),
    }
}

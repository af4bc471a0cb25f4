use axum::{Extension, Json, http::StatusCode};

use crate::app::dto::WhoAmIResponse;
use crate::context::{PrincipalContext, TenantContext};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse::from_contexts(&tenant, &principal))
}

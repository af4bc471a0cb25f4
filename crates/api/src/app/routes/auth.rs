use std::sync::Arc;

use axum::{Extension, Json, extract::rejection::JsonRejection, http::StatusCode, response::IntoResponse};
use tracing::{error, info};

use crate::app::dto::{LoginRequest, LoginResponse};
use crate::app::errors::{json_error, json_rejection_to_response};
use crate::app::services::AppServices;

const LOGIN_MESSAGE: &str = "Login successful. Use this token in the Authorization header as: Bearer <token>";

/// Mint a token for the asserted identity.
///
/// There is no credential check; whoever calls this gets a token for the
/// identity they name. What that identity may do is decided by the policy.
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return json_rejection_to_response(rejection),
    };

    let (user_id, organization_id, role) = match req.into_identity() {
        Ok(identity) => identity,
        Err(msg) => return json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
    };

    match services.issuer.issue(user_id.clone(), organization_id.clone(), role) {
        Ok(token) => {
            info!(user_id = %user_id, organization_id = %organization_id, "token issued");
            (
                StatusCode::OK,
                Json(LoginResponse {
                    token,
                    message: LOGIN_MESSAGE,
                }),
            )
                .into_response()
        }
        Err(err) => {
            error!(error = %err, "token signing failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "token_error", "could not issue token")
        }
    }
}

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::{error, warn};

use tenantnotes_auth::{AccessRequest, AuthError, JwtValidator, PolicyGate};

use crate::app::errors::json_error;
use crate::context::{PrincipalContext, TenantContext, contexts_from_claims};

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

#[derive(Clone)]
pub struct PolicyState {
    pub gate: Arc<dyn PolicyGate>,
}

/// Verify the bearer token and bind the request contexts.
///
/// Tenant and user identity come from the token only; headers such as
/// `X-Organization-ID` are never read.
pub async fn auth_middleware(State(state): State<AuthState>, mut req: Request, next: Next) -> Response {
    let token = match extract_bearer(req.headers()) {
        Ok(token) => token,
        Err(reason) => {
            return json_error(StatusCode::UNAUTHORIZED, "unauthorized", reason);
        }
    };

    let claims = match state.jwt.validate(token, Utc::now()) {
        Ok(claims) => claims,
        Err(AuthError::ExpiredToken) => {
            warn!(path = %req.uri().path(), "rejected stale token");
            return json_error(StatusCode::UNAUTHORIZED, "token_expired", "token has expired");
        }
        Err(err) => {
            warn!(path = %req.uri().path(), error = %err, "rejected untrusted token");
            return json_error(StatusCode::UNAUTHORIZED, "invalid_token", "invalid token");
        }
    };

    let (tenant, principal) = contexts_from_claims(claims);
    req.extensions_mut().insert(tenant);
    req.extensions_mut().insert(principal);

    next.run(req).await
}

/// Ask the policy gate about (user, organization, path, method) from the
/// bound contexts. Must run inside [`auth_middleware`].
pub async fn policy_middleware(State(state): State<PolicyState>, req: Request, next: Next) -> Response {
    let (Some(tenant), Some(principal)) = (
        req.extensions().get::<TenantContext>(),
        req.extensions().get::<PrincipalContext>(),
    ) else {
        return json_error(StatusCode::UNAUTHORIZED, "unauthorized", "request identity not established");
    };

    let method = req.method().as_str();
    let path = req.uri().path();
    let access = AccessRequest {
        subject: principal.user_id(),
        tenant: tenant.organization_id(),
        resource: path,
        action: method,
    };

    match state.gate.enforce(&access) {
        Ok(decision) if decision.allowed => {}
        Ok(decision) => {
            warn!(
                user_id = %principal.user_id(),
                organization_id = %tenant.organization_id(),
                method,
                path,
                matched_rule = ?decision.matched_rule,
                "request denied by policy"
            );
            let message = format!(
                "{method} {path} is not permitted for user {} in organization {}",
                principal.user_id(),
                tenant.organization_id()
            );
            return json_error(StatusCode::FORBIDDEN, "forbidden", message);
        }
        Err(err) => {
            error!(
                user_id = %principal.user_id(),
                organization_id = %tenant.organization_id(),
                method,
                path,
                error = %err,
                "policy evaluation failed"
            );
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "policy_error",
                "authorization policy could not be evaluated",
            );
        }
    }

    next.run(req).await
}

/// Accept exactly `Bearer <token>`.
fn extract_bearer(headers: &HeaderMap) -> Result<&str, &'static str> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or("authorization header missing")?;

    let header = header.to_str().map_err(|_| "authorization header is not valid text")?;

    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err("invalid authorization format, use: Bearer <token>"),
    }
}

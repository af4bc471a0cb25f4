//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: token, policy, note store and audit pipeline wiring
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response bodies
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs` and the
/// black-box tests).
///
/// Every `/api` request passes the context binder first and the policy gate
/// second; handlers only ever see requests both let through.
pub fn build_router(services: AppServices) -> Router {
    let auth_state = middleware::AuthState {
        jwt: services.validator.clone(),
    };
    let policy_state = middleware::PolicyState {
        gate: services.policy.clone(),
    };
    let services = Arc::new(services);

    // Layers wrap outside-in: the last one added runs first.
    let protected = routes::protected_router()
        .layer(axum::middleware::from_fn_with_state(
            policy_state,
            middleware::policy_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(auth_state, middleware::auth_middleware));

    Router::new()
        .merge(routes::public_router())
        .merge(protected)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}

use axum::{
    Router,
    routing::{get, post},
};

pub mod auth;
pub mod notes;
pub mod system;

/// Public routes: no token required.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/login", post(auth::login))
}

/// Routes behind the request context binder and the policy gate.
pub fn protected_router() -> Router {
    Router::new()
        .route("/api/whoami", get(system::whoami))
        .route("/api/notes", get(notes::list_notes).post(notes::create_note))
        .route("/api/notes/:id", get(notes::get_note))
}

//! HTTP API: routing, request context binding, and response mapping.

pub mod app;
pub mod context;
pub mod middleware;

pub use app::build_router;
pub use app::services::{AppServices, AuditRuntime, InMemoryBackends};

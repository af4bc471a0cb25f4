//! Audit events and the channel contract that carries them.
//!
//! - [`AuditEvent`]: immutable record of a mutating action, JSON on the wire
//! - [`AuditTransport`] / [`AuditSource`]: producer and consumer sides of a
//!   durable queue
//! - [`InMemoryAuditQueue`]: transport for tests and local runs

pub mod audit;
pub mod channel;
pub mod in_memory_queue;

pub use audit::{AuditAction, AuditEvent};
pub use channel::{AuditSource, AuditTransport, DeadLetter, Delivery, TransportError};
pub use in_memory_queue::InMemoryAuditQueue;

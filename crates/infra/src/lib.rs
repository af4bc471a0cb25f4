//! Infrastructure layer: stores, audit transport and consumer, config.

pub mod audit_channel;
pub mod audit_consumer;
pub mod audit_sink;
pub mod config;
pub mod migrations;
pub mod note_service;
pub mod notes;
pub mod policy_file;

pub use audit_channel::{AuditProducer, PublishError};
pub use audit_consumer::{AckMode, AuditConsumer, AuditConsumerConfig, AuditConsumerHandle, ConsumerStats};
pub use audit_sink::{AuditSink, InMemoryAuditSink, PostgresAuditSink, SinkWriteError};
pub use config::{AppConfig, AuditSettings, ConfigError, PersistentStores, StoreBackend};
pub use note_service::{AuditHandoff, HandoffStats, NoteService, NoteServiceError};
pub use notes::{InMemoryNoteStore, NoteStore, NoteStoreError, PostgresNoteStore};

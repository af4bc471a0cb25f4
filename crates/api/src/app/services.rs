//! Service wiring: token issuer/validator, policy gate, note store and the
//! audit pipeline, in either in-memory or persistent flavour.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use tenantnotes_auth::{
    Hs256JwtValidator, Hs256TokenIssuer, JwtValidator, PolicyGate, PolicyTable, RuleTablePolicy, TokenIssuer,
};
use tenantnotes_events::InMemoryAuditQueue;
use tenantnotes_infra::{
    AppConfig, AuditConsumer, AuditConsumerConfig, AuditConsumerHandle, AuditHandoff, AuditProducer, AuditSettings,
    InMemoryAuditSink, InMemoryNoteStore, NoteService, StoreBackend,
};

#[cfg(feature = "redis")]
use anyhow::Context;
#[cfg(feature = "redis")]
use sqlx::postgres::PgPoolOptions;
#[cfg(feature = "redis")]
use tenantnotes_infra::{
    PersistentStores, PostgresAuditSink, PostgresNoteStore, audit_channel::RedisStreamsAuditQueue, migrations,
};

/// Everything a request handler may need.
#[derive(Clone)]
pub struct AppServices {
    pub issuer: Arc<dyn TokenIssuer>,
    pub validator: Arc<dyn JwtValidator>,
    pub policy: Arc<dyn PolicyGate>,
    pub notes: NoteService,
}

impl core::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppServices").field("notes", &self.notes).finish()
    }
}

/// Background parts of the audit pipeline that must be stopped on shutdown.
#[derive(Debug)]
pub struct AuditRuntime {
    pub handoff: Arc<AuditHandoff>,
    pub consumer: AuditConsumerHandle,
}

impl AuditRuntime {
    /// Let in-flight publishes finish (up to `grace`), then stop the consumer.
    pub async fn shutdown(self, grace: Duration) {
        let aborted = self.handoff.drain(grace).await;
        if aborted > 0 {
            warn!(aborted, "audit events abandoned at shutdown");
        }
        let stats = self.consumer.stats();
        self.consumer.shutdown().await;
        info!(
            written = stats.written,
            dead_lettered = stats.dead_lettered,
            dropped = stats.dropped,
            "audit consumer stopped"
        );
    }
}

/// In-memory queue and sink, exposed so tests can observe the pipeline.
#[derive(Debug, Clone)]
pub struct InMemoryBackends {
    pub audit_queue: Arc<InMemoryAuditQueue>,
    pub audit_sink: Arc<InMemoryAuditSink>,
}

fn consumer_config(audit: &AuditSettings) -> AuditConsumerConfig {
    AuditConsumerConfig {
        ack_mode: audit.ack_mode,
        max_attempts: audit.max_attempts,
        ..AuditConsumerConfig::default()
    }
}

fn token_services(jwt_secret: &str) -> (Arc<dyn TokenIssuer>, Arc<dyn JwtValidator>) {
    (
        Arc::new(Hs256TokenIssuer::new(jwt_secret.as_bytes().to_vec())),
        Arc::new(Hs256JwtValidator::new(jwt_secret.as_bytes().to_vec())),
    )
}

/// Wire everything over in-process stores. Must be called inside a tokio
/// runtime (the audit consumer is spawned here).
pub fn build_in_memory_services(
    jwt_secret: &str,
    policy: PolicyTable,
    audit: &AuditSettings,
) -> (AppServices, AuditRuntime, InMemoryBackends) {
    let (issuer, validator) = token_services(jwt_secret);

    let audit_queue = Arc::new(InMemoryAuditQueue::new(audit.queue.clone()));
    let audit_sink = Arc::new(InMemoryAuditSink::new());

    let producer = Arc::new(AuditProducer::new(audit_queue.clone(), audit.publish_timeout));
    let handoff = Arc::new(AuditHandoff::new(producer));
    let consumer = AuditConsumer::spawn(audit_queue.clone(), audit_sink.clone(), consumer_config(audit));

    let services = AppServices {
        issuer,
        validator,
        policy: Arc::new(RuleTablePolicy::new(policy)),
        notes: NoteService::new(Arc::new(InMemoryNoteStore::new()), handoff.clone()),
    };

    (
        services,
        AuditRuntime { handoff, consumer },
        InMemoryBackends {
            audit_queue,
            audit_sink,
        },
    )
}

/// Wire everything over Postgres (notes and audit records) and Redis Streams
/// (audit channel). Schemas are created if missing.
#[cfg(feature = "redis")]
pub async fn build_persistent_services(
    jwt_secret: &str,
    policy: PolicyTable,
    stores: &PersistentStores,
    audit: &AuditSettings,
) -> anyhow::Result<(AppServices, AuditRuntime)> {
    let (issuer, validator) = token_services(jwt_secret);

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&stores.database_url)
        .await
        .context("failed to connect to the notes database")?;
    migrations::migrate_notes(&pool).await?;

    let audit_pool = if stores.audit_database_url == stores.database_url {
        pool.clone()
    } else {
        PgPoolOptions::new()
            .max_connections(5)
            .connect(&stores.audit_database_url)
            .await
            .context("failed to connect to the audit database")?
    };
    migrations::migrate_audit(&audit_pool, &audit.collection).await?;

    let queue = Arc::new(
        RedisStreamsAuditQueue::new(
            &stores.redis_url,
            audit.queue.clone(),
            audit.consumer_group.clone(),
            audit.consumer_name.clone(),
        )
        .context("failed to configure the audit queue")?,
    );
    let sink = PostgresAuditSink::new(audit_pool, &audit.collection, audit.sink_timeout)
        .context("failed to configure the audit sink")?;

    let producer = Arc::new(AuditProducer::new(queue.clone(), audit.publish_timeout));
    let handoff = Arc::new(AuditHandoff::new(producer));
    let consumer = AuditConsumer::spawn(queue, sink, consumer_config(audit));

    info!(
        queue = %audit.queue,
        group = %audit.consumer_group,
        collection = %audit.collection,
        "persistent stores ready"
    );

    let services = AppServices {
        issuer,
        validator,
        policy: Arc::new(RuleTablePolicy::new(policy)),
        notes: NoteService::new(Arc::new(PostgresNoteStore::new(pool)), handoff.clone()),
    };

    Ok((services, AuditRuntime { handoff, consumer }))
}

/// Pick the backend named by the configuration.
pub async fn build_services(config: &AppConfig, policy: PolicyTable) -> anyhow::Result<(AppServices, AuditRuntime)> {
    match &config.stores {
        StoreBackend::InMemory => {
            info!("using in-memory stores");
            let (services, runtime, _) = build_in_memory_services(&config.jwt_secret, policy, &config.audit);
            Ok((services, runtime))
        }
        #[cfg(feature = "redis")]
        StoreBackend::Persistent(stores) => {
            build_persistent_services(&config.jwt_secret, policy, stores, &config.audit).await
        }
        #[cfg(not(feature = "redis"))]
        StoreBackend::Persistent(_) => {
            anyhow::bail!("USE_PERSISTENT_STORES=true requires the `redis` feature")
        }
    }
}

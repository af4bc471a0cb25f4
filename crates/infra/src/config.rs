//! Process configuration, read from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::audit_consumer::AckMode;
use crate::audit_sink::is_sql_identifier;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Connection settings used when persistent stores are enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentStores {
    pub database_url: String,
    pub audit_database_url: String,
    pub redis_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Persistent(PersistentStores),
}

/// Audit pipeline settings (queue, consumer, sink).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditSettings {
    pub queue: String,
    pub consumer_group: String,
    pub consumer_name: String,
    pub collection: String,
    pub publish_timeout: Duration,
    pub sink_timeout: Duration,
    pub ack_mode: AckMode,
    pub max_attempts: u32,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            queue: "audit_queue".to_string(),
            consumer_group: "audit.writer".to_string(),
            consumer_name: "audit-writer-1".to_string(),
            collection: "activity_logs".to_string(),
            publish_timeout: Duration::from_millis(5000),
            sink_timeout: Duration::from_millis(5000),
            ack_mode: AckMode::AfterWrite,
            max_attempts: 5,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub jwt_secret: String,
    pub policy_path: PathBuf,
    pub stores: StoreBackend,
    pub audit: AuditSettings,
}

impl core::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("jwt_secret", &"<redacted>")
            .field("policy_path", &self.policy_path)
            .field("stores", &self.stores)
            .field("audit", &self.audit)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = parse_or("PORT", get("PORT"), DEFAULT_PORT)?;
        let persistent = parse_bool("USE_PERSISTENT_STORES", get("USE_PERSISTENT_STORES"))?;

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None if persistent => return Err(ConfigError::Missing("JWT_SECRET")),
            None => {
                tracing::warn!("JWT_SECRET not set; using the development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let stores = if persistent {
            let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
            StoreBackend::Persistent(PersistentStores {
                audit_database_url: get("AUDIT_DATABASE_URL").unwrap_or_else(|| database_url.clone()),
                database_url,
                redis_url: get("REDIS_URL").unwrap_or_else(|| "redis://localhost:6379".to_string()),
            })
        } else {
            StoreBackend::InMemory
        };

        let defaults = AuditSettings::default();
        let collection = get("AUDIT_COLLECTION").unwrap_or(defaults.collection);
        if !is_sql_identifier(&collection) {
            return Err(ConfigError::Invalid {
                key: "AUDIT_COLLECTION",
                value: collection,
                reason: "must be a plain SQL identifier".to_string(),
            });
        }

        let ack_mode = match get("AUDIT_ACK_MODE") {
            None => defaults.ack_mode,
            Some(v) => v.parse::<AckMode>().map_err(|reason| ConfigError::Invalid {
                key: "AUDIT_ACK_MODE",
                value: v,
                reason,
            })?,
        };

        let max_attempts: u32 = parse_or("AUDIT_MAX_ATTEMPTS", get("AUDIT_MAX_ATTEMPTS"), defaults.max_attempts)?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "AUDIT_MAX_ATTEMPTS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let audit = AuditSettings {
            queue: get("AUDIT_QUEUE").unwrap_or(defaults.queue),
            consumer_group: get("AUDIT_CONSUMER_GROUP").unwrap_or(defaults.consumer_group),
            consumer_name: get("AUDIT_CONSUMER_NAME").unwrap_or(defaults.consumer_name),
            collection,
            publish_timeout: parse_millis("AUDIT_PUBLISH_TIMEOUT_MS", get("AUDIT_PUBLISH_TIMEOUT_MS"), defaults.publish_timeout)?,
            sink_timeout: parse_millis("AUDIT_SINK_TIMEOUT_MS", get("AUDIT_SINK_TIMEOUT_MS"), defaults.sink_timeout)?,
            ack_mode,
            max_attempts,
        };

        Ok(Self {
            port,
            jwt_secret,
            policy_path: PathBuf::from(get("POLICY_PATH").unwrap_or_else(|| "policy.csv".to_string())),
            stores,
            audit,
        })
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(v) => v.parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value: v,
        }),
    }
}

fn parse_millis(key: &'static str, raw: Option<String>, default: Duration) -> Result<Duration, ConfigError> {
    let ms: u64 = parse_or(key, raw, default.as_millis() as u64)?;
    if ms == 0 {
        return Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
            reason: "timeout must be positive".to_string(),
        });
    }
    Ok(Duration::from_millis(ms))
}

fn parse_bool(key: &'static str, raw: Option<String>) -> Result<bool, ConfigError> {
    let normalized = raw.as_deref().map(str::to_ascii_lowercase);
    match normalized.as_deref() {
        None | Some("false") | Some("0") | Some("no") => Ok(false),
        Some("true") | Some("1") | Some("yes") => Ok(true),
        Some(_) => Err(ConfigError::Invalid {
            key,
            value: raw.unwrap_or_default(),
            reason: "expected true or false".to_string(),
        }),
    }
}

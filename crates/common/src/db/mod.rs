//! Persistence layer for LinguaChat
//!
//! Provides:
//! - The `UsageStore` boundary used by the recorder and the admin view
//! - SeaORM entity models and a Postgres-backed repository
//! - An in-memory store for tests and single-process development
//! - Connection pool management

mod memory;
pub mod models;
mod repository;

pub use memory::MemoryStore;
pub use repository::Repository;

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use crate::identity::Identity;
use crate::usage::{UsageRecord, UserRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Key-by-identity store for profiles and last-session usage.
///
/// All writes are upserts; reads are full scans.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Create the profile on first login, refresh it afterwards
    async fn upsert_user(&self, uid: &str, identity: &Identity, now: DateTime<Utc>) -> Result<()>;

    /// Overwrite the usage record for `uid`
    async fn upsert_usage(&self, uid: &str, record: &UsageRecord) -> Result<()>;

    async fn list_users(&self) -> Result<Vec<UserRecord>>;

    async fn list_usage(&self) -> Result<Vec<(String, UsageRecord)>>;

    /// Check the backend is reachable
    async fn ping(&self) -> Result<()>;
}

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(url: &str, config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let mut opts = ConnectOptions::new(url);
        opts.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(false);

        let conn = Database::connect(opts)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect: {}", e),
            })?;

        info!("Database connection established");

        Ok(Self { conn })
    }

    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        use sea_orm::ConnectionTrait;

        self.conn
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Ping failed: {}", e),
            })?;

        Ok(())
    }
}

/// Build the configured store.
///
/// `Ok(None)` means persistence is disabled: usage writes become no-ops and
/// the admin view reports its data as unavailable.
pub async fn create_store(config: &DatabaseConfig) -> Result<Option<Arc<dyn UsageStore>>> {
    match (config.backend.as_str(), config.url.as_deref()) {
        ("memory", _) => {
            info!("Using in-memory usage store");
            Ok(Some(Arc::new(MemoryStore::new())))
        }
        ("postgres", Some(url)) => {
            let repo = Repository::new(DbPool::new(url, config).await?);
            if config.ensure_schema {
                repo.ensure_schema().await?;
            }
            Ok(Some(Arc::new(repo)))
        }
        ("postgres", None) => {
            tracing::warn!("No database URL configured, usage persistence disabled");
            Ok(None)
        }
        (other, _) => Err(AppError::Configuration {
            message: format!("Unknown database backend: {}", other),
        }),
    }
}

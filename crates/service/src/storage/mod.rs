//! SQLite mirror of the on-chain evidence registry.
//!
//! The mirror is a cache, never the source of truth: every row traces back
//! to a ledger submission or a reconciliation read. It exists so that
//! verification and enumeration keep answering when the ledger is down.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub mod evidence;
pub mod types;

pub use types::*;

/// Async SQLite storage with connection pooling.
#[derive(Debug, Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Connect to the database at the given URL, creating the file if it
    /// does not exist.
    ///
    /// # Example
    /// ```no_run
    /// # use vigil_service::storage::Storage;
    /// # async fn example() -> anyhow::Result<()> {
    /// let storage = Storage::new("sqlite://vigil.db", None, None).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(
        database_url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        info!("Connecting to database: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.unwrap_or(5))
            .min_connections(min_connections.unwrap_or(1))
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        info!("Database connection established");

        Ok(Self { pool })
    }

    /// Connect using a filesystem path instead of a URL.
    pub async fn new_with_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let database_url = format!("sqlite://{}", path.display());
        Self::new(&database_url, None, None).await
    }

    /// Apply pending schema migrations. Call once at startup.
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Migrations completed successfully");

        Ok(())
    }

    /// Connection pool handle for custom queries or transactions.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        info!("Closing database connection");
        self.pool.close().await;
    }

    /// Per-status row counts for the mirror.
    pub async fn stats(&self) -> Result<MirrorStats> {
        let pending = self.count_by_status(vigil_core::RecordStatus::Pending).await?;
        let confirmed = self
            .count_by_status(vigil_core::RecordStatus::Confirmed)
            .await?;
        let failed = self.count_by_status(vigil_core::RecordStatus::Failed).await?;

        Ok(MirrorStats {
            pending,
            confirmed,
            failed,
        })
    }

    /// Check database health.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database health check failed")?;

        Ok(())
    }
}

/// Mirror row counts, split by submission status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorStats {
    pub pending: u64,
    pub confirmed: u64,
    pub failed: u64,
}

impl MirrorStats {
    pub fn total(&self) -> u64 {
        self.pending + self.confirmed + self.failed
    }
}

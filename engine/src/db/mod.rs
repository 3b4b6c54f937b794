/// Database module for SQLite persistence
///
/// This module provides the four logical tables of a review cycle: the
/// document catalog, the reviewer registry, the COI ledger and the response
/// store. It uses sqlx with parameterized queries and WAL mode for better
/// concurrency.
use anyhow::{Context, Result};
use sdk::errors::ScreenerError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

pub mod coi;
pub mod documents;
pub mod responses;
pub mod reviewers;

// Re-export commonly used types
pub use coi::CoiRepository;
pub use documents::DocumentRepository;
pub use responses::{ResponseRepository, ReviewedDocument, ReviewerProgress};
pub use reviewers::ReviewerRepository;

/// Database connection pool
pub struct Database {
    pool: SqlitePool,
}

/// Rows removed by an administrative clean slate
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct TruncateSummary {
    pub responses: u64,
    pub coi_decisions: u64,
}

impl Database {
    /// Create a new database connection
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Enable WAL mode for better concurrency
    /// 3. Run migrations to set up the schema
    pub async fn new(db_path: &Path) -> Result<Self> {
        info!("Initializing database at: {}", db_path.display());

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        // Configure SQLite connection with WAL mode
        let connection_string = format!("sqlite:{}", db_path.display());
        let options = SqliteConnectOptions::from_str(&connection_string)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(5))
            .disable_statement_logging();

        // Create connection pool
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        debug!("Database connection established");

        let db = Self { pool };

        // Run migrations
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    ///
    /// Migrations are idempotent and can be run multiple times safely.
    async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::raw_sql(include_str!("../../migrations/001_initial.sql"))
            .execute(&self.pool)
            .await
            .context("Failed to execute migration 001_initial.sql")?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Flush the WAL to disk
    ///
    /// This should be called during graceful shutdown to ensure all
    /// pending writes are persisted to the database file.
    pub async fn flush_wal(&self) -> Result<()> {
        info!("Flushing WAL to disk");

        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .context("Failed to flush WAL")?;

        debug!("WAL flushed successfully");
        Ok(())
    }

    /// Close the database connection
    ///
    /// This flushes the WAL and closes all connections in the pool.
    pub async fn close(self) -> Result<()> {
        info!("Closing database connection");

        self.flush_wal().await?;
        self.pool.close().await;

        info!("Database connection closed");
        Ok(())
    }

    /// Delete every COI decision and every response in one transaction.
    ///
    /// The document catalog and reviewer registry are left untouched.
    pub async fn truncate_activity(&self) -> Result<TruncateSummary> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| write_failed("Failed to begin clean slate", e))?;

        let responses = sqlx::query("DELETE FROM responses")
            .execute(&mut *tx)
            .await
            .map_err(|e| write_failed("Failed to truncate responses", e))?
            .rows_affected();

        let coi_decisions = sqlx::query("DELETE FROM coi_decisions")
            .execute(&mut *tx)
            .await
            .map_err(|e| write_failed("Failed to truncate COI decisions", e))?
            .rows_affected();

        tx.commit()
            .await
            .map_err(|e| write_failed("Failed to commit clean slate", e))?;

        info!(responses, coi_decisions, "Review activity truncated");

        Ok(TruncateSummary {
            responses,
            coi_decisions,
        })
    }

    /// Create a document repository
    pub fn documents(&self) -> DocumentRepository {
        DocumentRepository::new(self.pool.clone())
    }

    /// Create a reviewer repository
    pub fn reviewers(&self) -> ReviewerRepository {
        ReviewerRepository::new(self.pool.clone())
    }

    /// Create a COI ledger repository
    pub fn coi(&self) -> CoiRepository {
        CoiRepository::new(self.pool.clone())
    }

    /// Create a response repository
    pub fn responses(&self) -> ResponseRepository {
        ResponseRepository::new(self.pool.clone())
    }
}

/// A write the store refused or could not complete
///
/// Nothing was persisted: the statement or its transaction rolled back.
pub(crate) fn write_failed(action: &str, err: sqlx::Error) -> anyhow::Error {
    ScreenerError::Database(format!("{}: {}", action, err)).into()
}

/// Current unix timestamp in seconds
pub(crate) fn now_secs() -> Result<i64> {
    Ok(std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_secs() as i64)
}

/// Reviewer registry operations
use anyhow::{Context, Result};
use sdk::types::{Reviewer, ReviewerId};
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Reviewer repository for database operations
pub struct ReviewerRepository {
    pool: SqlitePool,
}

impl ReviewerRepository {
    /// Create a new reviewer repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a reviewer on an open connection or transaction
    pub async fn insert_with(conn: &mut SqliteConnection, reviewer: &Reviewer) -> Result<()> {
        sqlx::query("INSERT INTO reviewers (reviewer_id, reviewer_name) VALUES (?, ?)")
            .bind(reviewer.reviewer_id.0)
            .bind(&reviewer.reviewer_name)
            .execute(conn)
            .await
            .with_context(|| format!("Failed to insert reviewer {}", reviewer.reviewer_id))?;

        Ok(())
    }

    /// Look a reviewer up by their display name
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Reviewer>> {
        let row = sqlx::query(
            "SELECT reviewer_id, reviewer_name FROM reviewers WHERE reviewer_name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch reviewer")?;

        Ok(row.map(|r| Reviewer {
            reviewer_id: ReviewerId(r.get("reviewer_id")),
            reviewer_name: r.get("reviewer_name"),
        }))
    }

    /// Get a reviewer by ID
    pub async fn get_reviewer(&self, reviewer_id: ReviewerId) -> Result<Option<Reviewer>> {
        let row =
            sqlx::query("SELECT reviewer_id, reviewer_name FROM reviewers WHERE reviewer_id = ?")
                .bind(reviewer_id.0)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to fetch reviewer")?;

        Ok(row.map(|r| Reviewer {
            reviewer_id: ReviewerId(r.get("reviewer_id")),
            reviewer_name: r.get("reviewer_name"),
        }))
    }

    /// All reviewers sorted by name
    pub async fn list_reviewers(&self) -> Result<Vec<Reviewer>> {
        let rows =
            sqlx::query("SELECT reviewer_id, reviewer_name FROM reviewers ORDER BY reviewer_name")
                .fetch_all(&self.pool)
                .await
                .context("Failed to list reviewers")?;

        Ok(rows
            .into_iter()
            .map(|r| Reviewer {
                reviewer_id: ReviewerId(r.get("reviewer_id")),
                reviewer_name: r.get("reviewer_name"),
            })
            .collect())
    }
}

/// COI ledger operations
///
/// The ledger is append-only: one row per (reviewer, document) pair, written
/// the first time the reviewer screens the document. There is no retraction.
use anyhow::{Context, Result};
use sdk::types::{CoiDecision, Conflict, DocumentId, ReviewerId};
use sqlx::{Row, SqlitePool};

use super::{now_secs, write_failed};

/// COI ledger repository
pub struct CoiRepository {
    pool: SqlitePool,
}

impl CoiRepository {
    /// Create a new COI repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a decision
    ///
    /// Returns `false` when the pair was already screened; the existing row
    /// wins and nothing is written.
    pub async fn record_decision(
        &self,
        reviewer_id: ReviewerId,
        document_id: DocumentId,
        conflict: Conflict,
    ) -> Result<bool> {
        let now = now_secs()?;

        let result = sqlx::query(
            "INSERT INTO coi_decisions (reviewer_id, document_id, conflict, decided_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT (reviewer_id, document_id) DO NOTHING",
        )
        .bind(reviewer_id.0)
        .bind(document_id.0)
        .bind(conflict.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| write_failed("Failed to record COI decision", e))?;

        Ok(result.rows_affected() == 1)
    }

    /// Decision for one pair, if screened
    pub async fn get_decision(
        &self,
        reviewer_id: ReviewerId,
        document_id: DocumentId,
    ) -> Result<Option<CoiDecision>> {
        let row = sqlx::query(
            "SELECT reviewer_id, document_id, conflict, decided_at FROM coi_decisions WHERE reviewer_id = ? AND document_id = ?"
        )
        .bind(reviewer_id.0)
        .bind(document_id.0)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch COI decision")?;

        row.map(|r| decision_from_row(&r)).transpose()
    }

    /// Number of documents the reviewer has screened, whatever the outcome
    pub async fn count_for_reviewer(&self, reviewer_id: ReviewerId) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM coi_decisions WHERE reviewer_id = ?")
            .bind(reviewer_id.0)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count COI decisions")
    }

    /// All decisions of a reviewer in the order they were made
    pub async fn list_for_reviewer(&self, reviewer_id: ReviewerId) -> Result<Vec<CoiDecision>> {
        let rows = sqlx::query(
            "SELECT reviewer_id, document_id, conflict, decided_at FROM coi_decisions WHERE reviewer_id = ? ORDER BY id"
        )
        .bind(reviewer_id.0)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list COI decisions")?;

        rows.iter().map(decision_from_row).collect()
    }
}

fn decision_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CoiDecision> {
    let conflict: String = row.try_get("conflict")?;

    Ok(CoiDecision {
        reviewer_id: ReviewerId(row.try_get("reviewer_id")?),
        document_id: DocumentId(row.try_get("document_id")?),
        conflict: conflict.parse()?,
        decided_at: row.try_get("decided_at")?,
    })
}

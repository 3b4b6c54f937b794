/// Review response store
///
/// Responses are append-only with one exception: the reviewer's most recent
/// row (highest `screening_order`) may be rewritten in place by a redo.
///
/// The insert path is a single conditional `INSERT ... SELECT`. The
/// eligibility rules, the per-document cap and the next `screening_order` are
/// all evaluated inside that one statement, so two reviewers racing for the
/// last slot of a document cannot both land a row.
use anyhow::{Context, Result};
use sdk::errors::ScreenerError;
use sdk::types::{Document, DocumentId, ReviewResponse, ReviewerId, Score, Scores};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{info, warn};

use super::documents::{document_from_row, DOCUMENT_COLUMNS};
use super::{now_secs, write_failed};

/// A response joined with its document and reviewer name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewedDocument {
    pub reviewer_name: String,
    pub response: ReviewResponse,
    pub document: Document,
}

/// Review progress of one registered reviewer
///
/// `required` is what a session asks of the reviewer; `fraction_complete` is
/// measured against `quota`, the configured per-reviewer maximum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewerProgress {
    pub reviewer_id: ReviewerId,
    pub reviewer_name: String,
    pub completed: i64,
    pub required: u32,
    pub quota: u32,
    pub fraction_complete: f64,
}

const RESPONSE_COLUMNS: &str = "resp.reviewer_id, resp.document_id, resp.alignment, \
     resp.science, resp.benefits, resp.comments, resp.screening_order";

fn score_from_row(row: &SqliteRow, column: &str) -> Result<Score> {
    let value: i64 = row.try_get(column)?;
    Ok(Score::try_from(value)?)
}

fn response_from_row(row: &SqliteRow) -> Result<ReviewResponse> {
    Ok(ReviewResponse {
        reviewer_id: ReviewerId(row.try_get("reviewer_id")?),
        document_id: DocumentId(row.try_get("document_id")?),
        scores: Scores {
            alignment: score_from_row(row, "alignment")?,
            science: score_from_row(row, "science")?,
            benefits: score_from_row(row, "benefits")?,
        },
        comments: row.try_get("comments")?,
        screening_order: row.try_get("screening_order")?,
    })
}

fn reviewed_from_row(row: &SqliteRow) -> Result<ReviewedDocument> {
    Ok(ReviewedDocument {
        reviewer_name: row.try_get("reviewer_name")?,
        response: response_from_row(row)?,
        document: document_from_row(row)?,
    })
}

/// Rounded to two decimals, as shown on the progress board.
fn fraction(completed: i64, quota: u32) -> f64 {
    if quota == 0 {
        return 0.0;
    }
    (completed as f64 / f64::from(quota) * 100.0).round() / 100.0
}

/// Response repository for database operations
pub struct ResponseRepository {
    pool: SqlitePool,
}

impl ResponseRepository {
    /// Create a new response repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new response as the reviewer's next `screening_order`
    ///
    /// The row is written only if every assignment rule still holds at the
    /// moment of the write:
    /// - the reviewer has no response for this document yet
    /// - the reviewer screened the document and declared no conflict
    /// - the document has fewer than `max_per_document` responses
    /// - the reviewer holds fewer than `required` responses
    ///
    /// When nothing was written the first failing rule is reported as a
    /// `ScreenerError`.
    pub async fn insert_next(
        &self,
        reviewer_id: ReviewerId,
        document_id: DocumentId,
        scores: Scores,
        comments: &str,
        max_per_document: u32,
        required: u32,
    ) -> Result<ReviewResponse> {
        let now = now_secs()?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| write_failed("Failed to begin response insert", e))?;

        let result = sqlx::query(
            "INSERT INTO responses (reviewer_id, document_id, alignment, science, benefits, comments, screening_order, submitted_at, updated_at) \
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, \
                 COALESCE((SELECT MAX(screening_order) FROM responses WHERE reviewer_id = ?1), 0) + 1, ?7, ?7 \
             WHERE NOT EXISTS (SELECT 1 FROM responses WHERE reviewer_id = ?1 AND document_id = ?2) \
             AND EXISTS (SELECT 1 FROM coi_decisions WHERE reviewer_id = ?1 AND document_id = ?2 AND conflict = 'NO') \
             AND (SELECT COUNT(*) FROM responses WHERE document_id = ?2) < ?8 \
             AND (SELECT COUNT(*) FROM responses WHERE reviewer_id = ?1) < ?9",
        )
        .bind(reviewer_id.0)
        .bind(document_id.0)
        .bind(i64::from(scores.alignment))
        .bind(i64::from(scores.science))
        .bind(i64::from(scores.benefits))
        .bind(comments)
        .bind(now)
        .bind(i64::from(max_per_document))
        .bind(i64::from(required))
        .execute(&mut *tx)
        .await
        .map_err(|e| write_failed("Failed to insert review response", e))?;

        if result.rows_affected() == 0 {
            let rejection =
                diagnose_rejection(&mut *tx, reviewer_id, document_id, max_per_document, required)
                    .await?;
            warn!(
                reviewer_id = reviewer_id.0,
                document_id = document_id.0,
                reason = %rejection,
                "Review response rejected"
            );
            return Err(rejection.into());
        }

        let screening_order: i64 = sqlx::query_scalar(
            "SELECT screening_order FROM responses WHERE reviewer_id = ? AND document_id = ?",
        )
        .bind(reviewer_id.0)
        .bind(document_id.0)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to read back screening order")?;

        tx.commit()
            .await
            .map_err(|e| write_failed("Failed to commit review response", e))?;

        info!(
            reviewer_id = reviewer_id.0,
            document_id = document_id.0,
            screening_order,
            "Review response recorded"
        );

        Ok(ReviewResponse {
            reviewer_id,
            document_id,
            scores,
            comments: comments.to_string(),
            screening_order,
        })
    }

    /// Rewrite the reviewer's most recent response in place
    ///
    /// Only scores and comments change; the document and `screening_order`
    /// stay as they were. Fails with `NoPriorRecord` when the reviewer has no
    /// responses, and with `RedoTargetMismatch` when `document_id` is not the
    /// most recent one.
    pub async fn update_latest(
        &self,
        reviewer_id: ReviewerId,
        document_id: DocumentId,
        scores: Scores,
        comments: &str,
    ) -> Result<ReviewResponse> {
        let now = now_secs()?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| write_failed("Failed to begin response update", e))?;

        let result = sqlx::query(
            "UPDATE responses SET alignment = ?3, science = ?4, benefits = ?5, comments = ?6, updated_at = ?7 \
             WHERE reviewer_id = ?1 AND document_id = ?2 \
             AND screening_order = (SELECT MAX(screening_order) FROM responses WHERE reviewer_id = ?1)",
        )
        .bind(reviewer_id.0)
        .bind(document_id.0)
        .bind(i64::from(scores.alignment))
        .bind(i64::from(scores.science))
        .bind(i64::from(scores.benefits))
        .bind(comments)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| write_failed("Failed to update review response", e))?;

        if result.rows_affected() == 0 {
            let latest = max_order_with(&mut *tx, reviewer_id).await?;
            let rejection = match latest {
                None => ScreenerError::NoPriorRecord,
                Some(_) => ScreenerError::RedoTargetMismatch {
                    reviewer_id,
                    document_id,
                },
            };
            warn!(
                reviewer_id = reviewer_id.0,
                document_id = document_id.0,
                reason = %rejection,
                "Redo rejected"
            );
            return Err(rejection.into());
        }

        let screening_order: i64 = sqlx::query_scalar(
            "SELECT screening_order FROM responses WHERE reviewer_id = ? AND document_id = ?",
        )
        .bind(reviewer_id.0)
        .bind(document_id.0)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to read back screening order")?;

        tx.commit()
            .await
            .map_err(|e| write_failed("Failed to commit response update", e))?;

        info!(
            reviewer_id = reviewer_id.0,
            document_id = document_id.0,
            screening_order,
            "Review response updated"
        );

        Ok(ReviewResponse {
            reviewer_id,
            document_id,
            scores,
            comments: comments.to_string(),
            screening_order,
        })
    }

    /// The reviewer's most recent response joined with its document
    pub async fn latest_for_reviewer(
        &self,
        reviewer_id: ReviewerId,
    ) -> Result<Option<ReviewedDocument>> {
        let sql = format!(
            "SELECT {RESPONSE_COLUMNS}, rv.reviewer_name, {DOCUMENT_COLUMNS} \
             FROM responses resp \
             INNER JOIN documents d ON resp.document_id = d.document_id \
             INNER JOIN reviewers rv ON resp.reviewer_id = rv.reviewer_id \
             WHERE resp.reviewer_id = ?1 \
             AND resp.screening_order = (SELECT MAX(screening_order) FROM responses WHERE reviewer_id = ?1)"
        );

        let row = sqlx::query(&sql)
            .bind(reviewer_id.0)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch latest response")?;

        row.as_ref().map(reviewed_from_row).transpose()
    }

    /// Highest `screening_order` of the reviewer, if any
    pub async fn max_screening_order(&self, reviewer_id: ReviewerId) -> Result<Option<i64>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        max_order_with(&mut *conn, reviewer_id).await
    }

    /// Number of responses the reviewer has submitted
    pub async fn count_for_reviewer(&self, reviewer_id: ReviewerId) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM responses WHERE reviewer_id = ?")
            .bind(reviewer_id.0)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count reviewer responses")
    }

    /// Number of responses a document has received across all reviewers
    pub async fn count_for_document(&self, document_id: DocumentId) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM responses WHERE document_id = ?")
            .bind(document_id.0)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count document responses")
    }

    /// A reviewer's responses in screening order
    pub async fn list_for_reviewer(&self, reviewer_id: ReviewerId) -> Result<Vec<ReviewedDocument>> {
        let sql = format!(
            "SELECT {RESPONSE_COLUMNS}, rv.reviewer_name, {DOCUMENT_COLUMNS} \
             FROM responses resp \
             INNER JOIN documents d ON resp.document_id = d.document_id \
             INNER JOIN reviewers rv ON resp.reviewer_id = rv.reviewer_id \
             WHERE resp.reviewer_id = ? \
             ORDER BY resp.screening_order"
        );

        let rows = sqlx::query(&sql)
            .bind(reviewer_id.0)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list reviewer responses")?;

        rows.iter().map(reviewed_from_row).collect()
    }

    /// Every response of every reviewer
    pub async fn list_all(&self) -> Result<Vec<ReviewedDocument>> {
        let sql = format!(
            "SELECT {RESPONSE_COLUMNS}, rv.reviewer_name, {DOCUMENT_COLUMNS} \
             FROM responses resp \
             INNER JOIN documents d ON resp.document_id = d.document_id \
             INNER JOIN reviewers rv ON resp.reviewer_id = rv.reviewer_id \
             ORDER BY rv.reviewer_name, resp.screening_order"
        );

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list responses")?;

        rows.iter().map(reviewed_from_row).collect()
    }

    /// Delete all responses of one reviewer
    ///
    /// COI decisions are kept; screening is never repeated.
    pub async fn delete_for_reviewer(&self, reviewer_id: ReviewerId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM responses WHERE reviewer_id = ?")
            .bind(reviewer_id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| write_failed("Failed to delete reviewer responses", e))?;

        info!(
            reviewer_id = reviewer_id.0,
            deleted = result.rows_affected(),
            "Reviewer responses deleted"
        );

        Ok(result.rows_affected())
    }

    /// Progress of every registered reviewer, most complete first
    pub async fn progress(&self, required: u32, quota: u32) -> Result<Vec<ReviewerProgress>> {
        let rows = sqlx::query(
            "SELECT rv.reviewer_id, rv.reviewer_name, COUNT(resp.id) AS completed \
             FROM reviewers rv \
             LEFT JOIN responses resp ON resp.reviewer_id = rv.reviewer_id \
             GROUP BY rv.reviewer_id, rv.reviewer_name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to compute reviewer progress")?;

        let mut progress = rows
            .into_iter()
            .map(|r| {
                let completed: i64 = r.try_get("completed")?;
                Ok(ReviewerProgress {
                    reviewer_id: ReviewerId(r.try_get("reviewer_id")?),
                    reviewer_name: r.try_get("reviewer_name")?,
                    completed,
                    required,
                    quota,
                    fraction_complete: fraction(completed, quota),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        progress.sort_by(|a, b| {
            b.fraction_complete
                .total_cmp(&a.fraction_complete)
                .then_with(|| a.reviewer_name.cmp(&b.reviewer_name))
        });

        Ok(progress)
    }
}

async fn max_order_with(conn: &mut SqliteConnection, reviewer_id: ReviewerId) -> Result<Option<i64>> {
    sqlx::query_scalar("SELECT MAX(screening_order) FROM responses WHERE reviewer_id = ?")
        .bind(reviewer_id.0)
        .fetch_one(conn)
        .await
        .context("Failed to read max screening order")
}

/// Work out which assignment rule refused an insert.
async fn diagnose_rejection(
    conn: &mut SqliteConnection,
    reviewer_id: ReviewerId,
    document_id: DocumentId,
    max_per_document: u32,
    required: u32,
) -> Result<ScreenerError> {
    let document_exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM documents WHERE document_id = ?)")
            .bind(document_id.0)
            .fetch_one(&mut *conn)
            .await
            .context("Failed to check document")?;
    if !document_exists {
        return Ok(ScreenerError::DocumentNotFound(document_id));
    }

    let already_reviewed: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM responses WHERE reviewer_id = ? AND document_id = ?)",
    )
    .bind(reviewer_id.0)
    .bind(document_id.0)
    .fetch_one(&mut *conn)
    .await
    .context("Failed to check for duplicate response")?;
    if already_reviewed {
        return Ok(ScreenerError::DuplicateResponse {
            reviewer_id,
            document_id,
        });
    }

    let conflict: Option<String> = sqlx::query_scalar(
        "SELECT conflict FROM coi_decisions WHERE reviewer_id = ? AND document_id = ?",
    )
    .bind(reviewer_id.0)
    .bind(document_id.0)
    .fetch_optional(&mut *conn)
    .await
    .context("Failed to check COI decision")?;
    match conflict.as_deref() {
        None => {
            return Ok(ScreenerError::CoiNotScreened {
                reviewer_id,
                document_id,
            })
        }
        Some("YES") => {
            return Ok(ScreenerError::ConflictOfInterest {
                reviewer_id,
                document_id,
            })
        }
        Some(_) => {}
    }

    let document_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM responses WHERE document_id = ?")
            .bind(document_id.0)
            .fetch_one(&mut *conn)
            .await
            .context("Failed to count document responses")?;
    if document_count >= i64::from(max_per_document) {
        return Ok(ScreenerError::DocumentAtCapacity {
            document_id,
            count: document_count,
            cap: max_per_document,
        });
    }

    let reviewer_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM responses WHERE reviewer_id = ?")
            .bind(reviewer_id.0)
            .fetch_one(&mut *conn)
            .await
            .context("Failed to count reviewer responses")?;

    Ok(ScreenerError::ReviewQuotaReached {
        reviewer_id,
        count: reviewer_count,
        required,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, DocumentRepository, ReviewerRepository};
    use sdk::types::{Conflict, Reviewer};
    use tempfile::TempDir;

    fn scores(v: u8) -> Scores {
        let s = Score::new(v).unwrap();
        Scores {
            alignment: s,
            science: s,
            benefits: s,
        }
    }

    async fn setup(docs: i64, reviewers: i64) -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(&dir.path().join("test.db")).await.unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        for id in 1..=docs {
            let document = Document {
                document_id: DocumentId(id),
                first_name: "F".to_string(),
                last_name: "L".to_string(),
                institution: "I".to_string(),
                coauthors: None,
                title: format!("T{}", id),
                abstract_text: "A".to_string(),
                biosketch: "B".to_string(),
                leverage_plan: "P".to_string(),
                early_career: false,
                student: false,
            };
            DocumentRepository::insert_with(&mut tx, &document)
                .await
                .unwrap();
        }
        for id in 1..=reviewers {
            let reviewer = Reviewer {
                reviewer_id: ReviewerId(id),
                reviewer_name: format!("R{}", id),
            };
            ReviewerRepository::insert_with(&mut tx, &reviewer)
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();

        for r in 1..=reviewers {
            for d in 1..=docs {
                db.coi()
                    .record_decision(ReviewerId(r), DocumentId(d), Conflict::No)
                    .await
                    .unwrap();
            }
        }

        (dir, db)
    }

    fn rejection(err: &anyhow::Error) -> &ScreenerError {
        err.downcast_ref::<ScreenerError>().unwrap()
    }

    #[test]
    fn test_fraction_rounds_to_two_decimals() {
        assert_eq!(fraction(1, 3), 0.33);
        assert_eq!(fraction(2, 3), 0.67);
        assert_eq!(fraction(15, 15), 1.0);
        assert_eq!(fraction(0, 15), 0.0);
    }

    #[tokio::test]
    async fn test_insert_assigns_consecutive_orders() {
        let (_dir, db) = setup(3, 1).await;
        let repo = db.responses();

        for (i, doc) in [2, 3, 1].into_iter().enumerate() {
            let response = repo
                .insert_next(ReviewerId(1), DocumentId(doc), scores(1), "c", 3, 15)
                .await
                .unwrap();
            assert_eq!(response.screening_order, i as i64 + 1);
        }
        assert_eq!(repo.max_screening_order(ReviewerId(1)).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate() {
        let (_dir, db) = setup(1, 1).await;
        let repo = db.responses();

        repo.insert_next(ReviewerId(1), DocumentId(1), scores(2), "c", 3, 15)
            .await
            .unwrap();
        let err = repo
            .insert_next(ReviewerId(1), DocumentId(1), scores(3), "c", 3, 15)
            .await
            .unwrap_err();

        assert!(matches!(
            rejection(&err),
            ScreenerError::DuplicateResponse { .. }
        ));
        assert_eq!(repo.count_for_document(DocumentId(1)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_respects_document_cap() {
        let (_dir, db) = setup(1, 3).await;
        let repo = db.responses();

        for r in 1..=2 {
            repo.insert_next(ReviewerId(r), DocumentId(1), scores(2), "c", 2, 15)
                .await
                .unwrap();
        }
        let err = repo
            .insert_next(ReviewerId(3), DocumentId(1), scores(2), "c", 2, 15)
            .await
            .unwrap_err();

        assert!(matches!(
            rejection(&err),
            ScreenerError::DocumentAtCapacity { count: 2, cap: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_insert_respects_reviewer_quota() {
        let (_dir, db) = setup(2, 1).await;
        let repo = db.responses();

        repo.insert_next(ReviewerId(1), DocumentId(1), scores(2), "c", 3, 1)
            .await
            .unwrap();
        let err = repo
            .insert_next(ReviewerId(1), DocumentId(2), scores(2), "c", 3, 1)
            .await
            .unwrap_err();

        assert!(matches!(
            rejection(&err),
            ScreenerError::ReviewQuotaReached { count: 1, required: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_insert_unknown_document() {
        let (_dir, db) = setup(1, 1).await;

        let err = db
            .responses()
            .insert_next(ReviewerId(1), DocumentId(42), scores(2), "c", 3, 15)
            .await
            .unwrap_err();
        assert!(matches!(
            rejection(&err),
            ScreenerError::DocumentNotFound(DocumentId(42))
        ));
    }

    #[tokio::test]
    async fn test_update_without_prior_record() {
        let (_dir, db) = setup(1, 1).await;

        let err = db
            .responses()
            .update_latest(ReviewerId(1), DocumentId(1), scores(4), "c")
            .await
            .unwrap_err();
        assert!(matches!(rejection(&err), ScreenerError::NoPriorRecord));
    }

    #[tokio::test]
    async fn test_update_only_touches_latest() {
        let (_dir, db) = setup(2, 1).await;
        let repo = db.responses();

        repo.insert_next(ReviewerId(1), DocumentId(1), scores(1), "first", 3, 15)
            .await
            .unwrap();
        repo.insert_next(ReviewerId(1), DocumentId(2), scores(1), "second", 3, 15)
            .await
            .unwrap();

        let err = repo
            .update_latest(ReviewerId(1), DocumentId(1), scores(4), "edited")
            .await
            .unwrap_err();
        assert!(matches!(
            rejection(&err),
            ScreenerError::RedoTargetMismatch { .. }
        ));

        let updated = repo
            .update_latest(ReviewerId(1), DocumentId(2), scores(4), "edited")
            .await
            .unwrap();
        assert_eq!(updated.screening_order, 2);

        let latest = repo.latest_for_reviewer(ReviewerId(1)).await.unwrap().unwrap();
        assert_eq!(latest.response.comments, "edited");
        assert_eq!(latest.response.scores, scores(4));
        assert_eq!(latest.document.title, "T2");
        assert_eq!(latest.reviewer_name, "R1");
        assert_eq!(repo.count_for_reviewer(ReviewerId(1)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_comments_stored_verbatim() {
        let (_dir, db) = setup(1, 1).await;
        let repo = db.responses();
        let raw = "fluids; rheology\nand more";

        repo.insert_next(ReviewerId(1), DocumentId(1), scores(3), raw, 3, 15)
            .await
            .unwrap();

        let rows = repo.list_for_reviewer(ReviewerId(1)).await.unwrap();
        assert_eq!(rows[0].response.comments, raw);
    }
}

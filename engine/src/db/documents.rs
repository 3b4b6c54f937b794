/// Document catalog operations
///
/// The catalog is read-only during a review cycle. Besides plain lookups this
/// repository owns the two random selection queries the assignment engine
/// draws from.
use anyhow::{Context, Result};
use sdk::types::{Document, DocumentId, ReviewerId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Columns of `documents` in the order `document_from_row` expects.
pub(crate) const DOCUMENT_COLUMNS: &str = "d.document_id, d.first_name, d.last_name, \
     d.institution, d.coauthors, d.title, d.abstract, d.biosketch, d.leverage_plan, \
     d.early_career, d.student";

/// Build a `Document` from a row selected with `DOCUMENT_COLUMNS`.
pub(crate) fn document_from_row(row: &SqliteRow) -> Result<Document> {
    Ok(Document {
        document_id: DocumentId(row.try_get("document_id")?),
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        institution: row.try_get("institution")?,
        coauthors: row.try_get("coauthors")?,
        title: row.try_get("title")?,
        abstract_text: row.try_get("abstract")?,
        biosketch: row.try_get("biosketch")?,
        leverage_plan: row.try_get("leverage_plan")?,
        early_career: row.try_get("early_career")?,
        student: row.try_get("student")?,
    })
}

/// Document repository for database operations
pub struct DocumentRepository {
    pool: SqlitePool,
}

impl DocumentRepository {
    /// Create a new document repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a catalog entry on an open connection or transaction
    pub async fn insert_with(conn: &mut SqliteConnection, document: &Document) -> Result<()> {
        sqlx::query(
            "INSERT INTO documents (document_id, first_name, last_name, institution, coauthors, title, abstract, biosketch, leverage_plan, early_career, student) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(document.document_id.0)
        .bind(&document.first_name)
        .bind(&document.last_name)
        .bind(&document.institution)
        .bind(&document.coauthors)
        .bind(&document.title)
        .bind(&document.abstract_text)
        .bind(&document.biosketch)
        .bind(&document.leverage_plan)
        .bind(document.early_career)
        .bind(document.student)
        .execute(conn)
        .await
        .with_context(|| format!("Failed to insert document {}", document.document_id))?;

        Ok(())
    }

    /// Get a document by ID
    pub async fn get_document(&self, document_id: DocumentId) -> Result<Option<Document>> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents d WHERE d.document_id = ?");

        let row = sqlx::query(&sql)
            .bind(document_id.0)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch document")?;

        row.as_ref().map(document_from_row).transpose()
    }

    /// All documents ordered by ID
    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents d ORDER BY d.document_id");

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list documents")?;

        rows.iter().map(document_from_row).collect()
    }

    /// Number of documents in the catalog
    pub async fn count_documents(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count documents")
    }

    /// A uniformly random document the reviewer has not yet screened for COI
    ///
    /// Any ledger row excludes the document, whatever its outcome.
    pub async fn random_unscreened(&self, reviewer_id: ReviewerId) -> Result<Option<Document>> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents d \
             WHERE d.document_id NOT IN (SELECT document_id FROM coi_decisions WHERE reviewer_id = ?1) \
             ORDER BY RANDOM() LIMIT 1"
        );

        let row = sqlx::query(&sql)
            .bind(reviewer_id.0)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to select document for COI screening")?;

        row.as_ref().map(document_from_row).transpose()
    }

    /// A uniformly random document from the reviewer's assignment pool
    ///
    /// The pool excludes documents the reviewer declared a conflict with,
    /// documents the reviewer already reviewed, and documents at or above
    /// `max_per_document` responses across all reviewers. The pool is empty
    /// once the reviewer holds `required` responses.
    pub async fn random_eligible(
        &self,
        reviewer_id: ReviewerId,
        max_per_document: u32,
        required: u32,
    ) -> Result<Option<Document>> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents d \
             WHERE d.document_id NOT IN ( \
                 SELECT document_id FROM coi_decisions WHERE reviewer_id = ?1 AND conflict = 'YES') \
             AND d.document_id NOT IN ( \
                 SELECT document_id FROM responses WHERE reviewer_id = ?1) \
             AND d.document_id NOT IN ( \
                 SELECT document_id FROM responses GROUP BY document_id HAVING COUNT(*) >= ?2) \
             AND (SELECT COUNT(*) FROM responses WHERE reviewer_id = ?1) < ?3 \
             ORDER BY RANDOM() LIMIT 1"
        );

        let row = sqlx::query(&sql)
            .bind(reviewer_id.0)
            .bind(i64::from(max_per_document))
            .bind(i64::from(required))
            .fetch_optional(&self.pool)
            .await
            .context("Failed to select document for review")?;

        row.as_ref().map(document_from_row).transpose()
    }
}

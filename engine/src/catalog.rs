//! Catalog import
//!
//! Documents and reviewers are reference data, loaded once per review cycle
//! from a JSON file:
//!
//! ```json
//! {
//!   "documents": [{ "document_id": 1, "first_name": "...", ... }],
//!   "reviewers": [{ "reviewer_id": 1, "reviewer_name": "..." }]
//! }
//! ```
//!
//! The whole file is validated before anything is written, and then inserted
//! in a single transaction.

use anyhow::{Context, Result};
use sdk::errors::ScreenerError;
use sdk::types::{Document, Reviewer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use crate::db::{Database, DocumentRepository, ReviewerRepository};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub reviewers: Vec<Reviewer>,
}

/// Rows written by an import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub documents: usize,
    pub reviewers: usize,
}

impl Catalog {
    /// Read and validate a catalog file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file {}", path.display()))?;

        let catalog: Catalog = serde_json::from_str(&contents)
            .map_err(|e| ScreenerError::Catalog(format!("Invalid catalog JSON: {}", e)))?;

        catalog.validate()?;
        Ok(catalog)
    }

    /// Check ids and names are unique and required text is present
    pub fn validate(&self) -> Result<(), ScreenerError> {
        let mut document_ids = HashSet::new();
        for document in &self.documents {
            if !document_ids.insert(document.document_id) {
                return Err(ScreenerError::Catalog(format!(
                    "Duplicate document id {}",
                    document.document_id
                )));
            }
            if document.title.trim().is_empty() {
                return Err(ScreenerError::Catalog(format!(
                    "Document {} has no title",
                    document.document_id
                )));
            }
            if document.first_name.trim().is_empty() && document.last_name.trim().is_empty() {
                return Err(ScreenerError::Catalog(format!(
                    "Document {} has no author name",
                    document.document_id
                )));
            }
        }

        let mut reviewer_ids = HashSet::new();
        let mut reviewer_names = HashSet::new();
        for reviewer in &self.reviewers {
            if !reviewer_ids.insert(reviewer.reviewer_id) {
                return Err(ScreenerError::Catalog(format!(
                    "Duplicate reviewer id {}",
                    reviewer.reviewer_id
                )));
            }
            if reviewer.reviewer_name.trim().is_empty() {
                return Err(ScreenerError::Catalog(format!(
                    "Reviewer {} has no name",
                    reviewer.reviewer_id
                )));
            }
            if !reviewer_names.insert(reviewer.reviewer_name.as_str()) {
                return Err(ScreenerError::Catalog(format!(
                    "Duplicate reviewer name '{}'",
                    reviewer.reviewer_name
                )));
            }
        }

        Ok(())
    }

    /// Insert every entry in one transaction
    ///
    /// Ids that already exist in the database abort the whole import; the
    /// catalog is never overwritten.
    pub async fn import(&self, db: &Database) -> Result<ImportSummary> {
        self.validate()?;

        let documents = db.documents();
        for document in &self.documents {
            if documents.get_document(document.document_id).await?.is_some() {
                return Err(ScreenerError::Catalog(format!(
                    "Document {} already imported",
                    document.document_id
                ))
                .into());
            }
        }

        let reviewers = db.reviewers();
        for reviewer in &self.reviewers {
            if reviewers.get_reviewer(reviewer.reviewer_id).await?.is_some()
                || reviewers.get_by_name(&reviewer.reviewer_name).await?.is_some()
            {
                return Err(ScreenerError::Catalog(format!(
                    "Reviewer {} already imported",
                    reviewer.reviewer_id
                ))
                .into());
            }
        }

        let mut tx = db
            .pool()
            .begin()
            .await
            .context("Failed to begin catalog import")?;

        for document in &self.documents {
            DocumentRepository::insert_with(&mut tx, document).await?;
        }
        for reviewer in &self.reviewers {
            ReviewerRepository::insert_with(&mut tx, reviewer).await?;
        }

        tx.commit()
            .await
            .context("Failed to commit catalog import")?;

        let summary = ImportSummary {
            documents: self.documents.len(),
            reviewers: self.reviewers.len(),
        };
        info!(
            documents = summary.documents,
            reviewers = summary.reviewers,
            "Catalog imported"
        );

        Ok(summary)
    }
}

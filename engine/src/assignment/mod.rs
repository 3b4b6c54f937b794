//! Assignment engine
//!
//! Decides which document a reviewer sees next, records their COI decisions
//! and submissions, and reports progress. All state lives in the database;
//! the engine itself only carries the configured limits.
//!
//! Two pools are drawn from:
//!
//! - the COI pool: documents the reviewer has not screened yet
//! - the review pool: documents the reviewer screened with no conflict, has
//!   not reviewed yet, and that are below the per-document cap
//!
//! The review pool is only opened once the COI pool is empty.

use anyhow::Result;
use sdk::errors::ScreenerError;
use sdk::types::{Conflict, Document, DocumentId, ReviewResponse, ReviewerId, Scores};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ReviewLimits;
use crate::db::{
    CoiRepository, Database, DocumentRepository, ResponseRepository, ReviewedDocument,
};

/// COI screening counters for one reviewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoiProgress {
    pub screened: i64,
    pub total: i64,
}

impl CoiProgress {
    /// True once every document carries a decision from the reviewer
    pub fn is_complete(&self) -> bool {
        self.screened >= self.total
    }
}

/// Review counters for one reviewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReviewProgress {
    pub completed: i64,
    pub required: u32,
}

impl ReviewProgress {
    pub fn is_complete(&self) -> bool {
        self.completed >= i64::from(self.required)
    }
}

pub struct AssignmentEngine {
    documents: DocumentRepository,
    coi: CoiRepository,
    responses: ResponseRepository,
    limits: ReviewLimits,
}

impl AssignmentEngine {
    pub fn new(db: &Database, limits: ReviewLimits) -> Self {
        Self {
            documents: db.documents(),
            coi: db.coi(),
            responses: db.responses(),
            limits,
        }
    }

    pub fn limits(&self) -> ReviewLimits {
        self.limits
    }

    /// Next document to screen for COI, or `None` when screening is complete
    ///
    /// The pick is a uniform random sample over the unscreened documents.
    pub async fn next_document_for_coi(&self, reviewer_id: ReviewerId) -> Result<Option<Document>> {
        let document = self.documents.random_unscreened(reviewer_id).await?;

        match &document {
            Some(d) => debug!(
                reviewer_id = reviewer_id.0,
                document_id = d.document_id.0,
                "Document selected for COI screening"
            ),
            None => debug!(reviewer_id = reviewer_id.0, "COI screening complete"),
        }

        Ok(document)
    }

    /// Next document to review, or `None` when the reviewer's queue is exhausted
    ///
    /// The pick is intentionally non-reproducible: a uniform random sample
    /// from the eligible set. This spreads load across documents and keeps
    /// reviewers from seeing the catalog in the same order.
    ///
    /// Fails with `CoiScreeningIncomplete` while any document is still
    /// unscreened for this reviewer. Returns `None` without querying the
    /// pool once the reviewer holds `required_reviews` responses.
    pub async fn next_document_for_review(
        &self,
        reviewer_id: ReviewerId,
    ) -> Result<Option<Document>> {
        let coi = self.coi_progress(reviewer_id).await?;
        if !coi.is_complete() {
            return Err(ScreenerError::CoiScreeningIncomplete {
                screened: coi.screened,
                total: coi.total,
            }
            .into());
        }

        let progress = self.review_progress(reviewer_id).await?;
        if progress.is_complete() {
            debug!(
                reviewer_id = reviewer_id.0,
                completed = progress.completed,
                "Review quota met"
            );
            return Ok(None);
        }

        let document = self
            .documents
            .random_eligible(
                reviewer_id,
                self.limits.max_reviews_per_document,
                self.limits.required_reviews,
            )
            .await?;

        match &document {
            Some(d) => debug!(
                reviewer_id = reviewer_id.0,
                document_id = d.document_id.0,
                "Document selected for review"
            ),
            None => debug!(reviewer_id = reviewer_id.0, "Assignment pool empty"),
        }

        Ok(document)
    }

    /// Append a COI decision
    ///
    /// A second decision for an already screened pair is ignored: the first
    /// one stands and a warning is logged. Returns whether a row was written.
    pub async fn record_coi_decision(
        &self,
        reviewer_id: ReviewerId,
        document_id: DocumentId,
        conflict: Conflict,
    ) -> Result<bool> {
        if self.documents.get_document(document_id).await?.is_none() {
            return Err(ScreenerError::DocumentNotFound(document_id).into());
        }

        let inserted = self
            .coi
            .record_decision(reviewer_id, document_id, conflict)
            .await?;

        if inserted {
            info!(
                reviewer_id = reviewer_id.0,
                document_id = document_id.0,
                conflict = conflict.as_str(),
                "COI decision recorded"
            );
        } else {
            warn!(
                reviewer_id = reviewer_id.0,
                document_id = document_id.0,
                "COI decision already recorded, keeping the first one"
            );
        }

        Ok(inserted)
    }

    /// Store a response to a new document
    ///
    /// The next `screening_order` is assigned by the store in the same
    /// statement that checks eligibility and the cap.
    pub async fn submit_response(
        &self,
        reviewer_id: ReviewerId,
        document_id: DocumentId,
        scores: Scores,
        comments: &str,
    ) -> Result<ReviewResponse> {
        self.responses
            .insert_next(
                reviewer_id,
                document_id,
                scores,
                comments,
                self.limits.max_reviews_per_document,
                self.limits.required_reviews,
            )
            .await
    }

    /// Rewrite the reviewer's most recent response
    pub async fn update_response(
        &self,
        reviewer_id: ReviewerId,
        document_id: DocumentId,
        scores: Scores,
        comments: &str,
    ) -> Result<ReviewResponse> {
        self.responses
            .update_latest(reviewer_id, document_id, scores, comments)
            .await
    }

    /// The response a redo would edit
    ///
    /// Fails with `NoPriorRecord` when the reviewer has not submitted anything.
    pub async fn latest_response(&self, reviewer_id: ReviewerId) -> Result<ReviewedDocument> {
        self.responses
            .latest_for_reviewer(reviewer_id)
            .await?
            .ok_or_else(|| ScreenerError::NoPriorRecord.into())
    }

    /// Delete the reviewer's responses, keeping their COI decisions
    pub async fn reset_reviewer(&self, reviewer_id: ReviewerId) -> Result<u64> {
        self.responses.delete_for_reviewer(reviewer_id).await
    }

    pub async fn coi_progress(&self, reviewer_id: ReviewerId) -> Result<CoiProgress> {
        let screened = self.coi.count_for_reviewer(reviewer_id).await?;
        let total = self.documents.count_documents().await?;
        Ok(CoiProgress { screened, total })
    }

    pub async fn review_progress(&self, reviewer_id: ReviewerId) -> Result<ReviewProgress> {
        let completed = self.responses.count_for_reviewer(reviewer_id).await?;
        Ok(ReviewProgress {
            completed,
            required: self.limits.required_reviews,
        })
    }
}

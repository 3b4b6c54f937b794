//! Review session state machine
//!
//! A session walks one reviewer through COI screening and then scoring:
//!
//! ```text
//! CoiScreening --decide_coi--> CoiScreening ... --> Selecting
//! Selecting --> Scoring(Insert) --commit--> Submitted --next--> Selecting
//! Selecting --> Done --refresh_user--> Selecting
//! Scoring / Submitted --redo--> Scoring(UpdateLatest) --commit--> Submitted
//! ```
//!
//! `Selecting` is transient: every operation that lands there immediately
//! asks the assignment engine for the next document.
//!
//! All state is carried in an explicit [`SessionContext`] owned by the
//! caller. The workflow only replaces the phase after the store accepted a
//! write, so a failed commit leaves the session exactly where it was.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sdk::errors::ScreenerError;
use sdk::types::{Conflict, Document, ReviewField, ReviewResponse, Reviewer, Score, Scores};
use serde::Serialize;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::assignment::{AssignmentEngine, CoiProgress, ReviewProgress};
use crate::config::ReviewLimits;
use crate::db::{Database, ReviewerRepository};

/// How a committed draft reaches the response store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmissionMode {
    /// A new row with the next `screening_order`
    Insert,
    /// Rewrite of the reviewer's most recent row
    UpdateLatest { screening_order: i64 },
}

/// Scores and comments being filled in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoreDraft {
    pub alignment: Option<Score>,
    pub science: Option<Score>,
    pub benefits: Option<Score>,
    pub comments: Option<String>,
}

impl ScoreDraft {
    /// Prefill from a stored response
    pub fn from_response(response: &ReviewResponse) -> Self {
        Self {
            alignment: Some(response.scores.alignment),
            science: Some(response.scores.science),
            benefits: Some(response.scores.benefits),
            comments: Some(response.comments.clone()),
        }
    }

    pub fn get_score(&self, field: ReviewField) -> Option<Score> {
        match field {
            ReviewField::Alignment => self.alignment,
            ReviewField::Science => self.science,
            ReviewField::Benefits => self.benefits,
            ReviewField::Comments => None,
        }
    }

    /// Fields still unset, in form order
    pub fn missing_fields(&self) -> Vec<ReviewField> {
        ReviewField::ALL
            .into_iter()
            .filter(|field| match field {
                ReviewField::Comments => self.comments.is_none(),
                criterion => self.get_score(*criterion).is_none(),
            })
            .collect()
    }

    /// Scores and comments ready for the store
    pub fn complete(&self) -> Result<(Scores, String), ScreenerError> {
        match (self.alignment, self.science, self.benefits, &self.comments) {
            (Some(alignment), Some(science), Some(benefits), Some(comments)) => Ok((
                Scores {
                    alignment,
                    science,
                    benefits,
                },
                comments.clone(),
            )),
            _ => Err(ScreenerError::IncompleteReview {
                missing: self.missing_fields(),
            }),
        }
    }
}

/// Where a session currently stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewPhase {
    /// Waiting for a yes/no conflict answer on `document`
    CoiScreening { document: Document },
    /// About to ask for the next document to review
    Selecting,
    Scoring {
        document: Document,
        draft: ScoreDraft,
        mode: SubmissionMode,
    },
    Submitted {
        response: ReviewResponse,
        mode: SubmissionMode,
    },
    /// No more documents for this reviewer
    Done,
}

impl ReviewPhase {
    pub fn label(&self) -> &'static str {
        match self {
            ReviewPhase::CoiScreening { .. } => "coi_screening",
            ReviewPhase::Selecting => "selecting",
            ReviewPhase::Scoring {
                mode: SubmissionMode::Insert,
                ..
            } => "scoring",
            ReviewPhase::Scoring {
                mode: SubmissionMode::UpdateLatest { .. },
                ..
            } => "redo",
            ReviewPhase::Submitted { .. } => "submitted",
            ReviewPhase::Done => "done",
        }
    }

    /// The document on screen, if any
    pub fn document(&self) -> Option<&Document> {
        match self {
            ReviewPhase::CoiScreening { document } | ReviewPhase::Scoring { document, .. } => {
                Some(document)
            }
            _ => None,
        }
    }
}

/// Per-session state, created at session start and dropped at session end
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: Uuid,
    pub reviewer: Reviewer,
    pub limits: ReviewLimits,
    pub started_at: DateTime<Utc>,
    pub coi_complete: bool,
    phase: ReviewPhase,
}

impl SessionContext {
    pub fn phase(&self) -> &ReviewPhase {
        &self.phase
    }

    fn transition(&mut self, next: ReviewPhase) {
        debug!(
            session_id = %self.session_id,
            from = self.phase.label(),
            to = next.label(),
            "Session transition"
        );
        self.phase = next;
    }
}

/// What the presentation layer shows for a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub reviewer_name: String,
    pub phase: &'static str,
    pub document: Option<Document>,
    pub draft: Option<ScoreDraft>,
    pub coi: CoiProgress,
    pub reviews: ReviewProgress,
    pub review_complete: bool,
    pub redo_available: bool,
}

/// Drives sessions against the assignment engine
pub struct ReviewWorkflow {
    engine: AssignmentEngine,
    reviewers: ReviewerRepository,
}

impl ReviewWorkflow {
    pub fn new(db: &Database, limits: ReviewLimits) -> Self {
        Self {
            engine: AssignmentEngine::new(db, limits),
            reviewers: db.reviewers(),
        }
    }

    pub fn engine(&self) -> &AssignmentEngine {
        &self.engine
    }

    /// Open a session for a registered reviewer and move to the first prompt
    #[instrument(skip(self))]
    pub async fn start(&self, reviewer_name: &str) -> Result<SessionContext> {
        let reviewer = self
            .reviewers
            .get_by_name(reviewer_name)
            .await?
            .ok_or_else(|| ScreenerError::ReviewerNotFound(reviewer_name.to_string()))?;

        let mut ctx = SessionContext {
            session_id: Uuid::new_v4(),
            reviewer,
            limits: self.engine.limits(),
            started_at: Utc::now(),
            coi_complete: false,
            phase: ReviewPhase::Selecting,
        };

        debug!(
            session_id = %ctx.session_id,
            reviewer_id = ctx.reviewer.reviewer_id.0,
            "Session started"
        );

        self.advance(&mut ctx).await?;
        Ok(ctx)
    }

    /// Ask for the next prompt: a COI question while screening is open,
    /// otherwise the next document to score or `Done`
    ///
    /// From `Scoring` the unsaved draft is dropped; this is how a session
    /// moves on after the store refused a commit.
    #[instrument(skip_all, fields(session_id = %ctx.session_id))]
    pub async fn advance(&self, ctx: &mut SessionContext) -> Result<()> {
        if !matches!(
            ctx.phase,
            ReviewPhase::Selecting | ReviewPhase::Scoring { .. } | ReviewPhase::Submitted { .. }
        ) {
            return Err(invalid(ctx, "advance"));
        }

        let reviewer_id = ctx.reviewer.reviewer_id;

        if !ctx.coi_complete {
            if let Some(document) = self.engine.next_document_for_coi(reviewer_id).await? {
                ctx.transition(ReviewPhase::CoiScreening { document });
                return Ok(());
            }
            ctx.coi_complete = true;
        }

        let next = match self.engine.next_document_for_review(reviewer_id).await? {
            Some(document) => ReviewPhase::Scoring {
                document,
                draft: ScoreDraft::default(),
                mode: SubmissionMode::Insert,
            },
            None => ReviewPhase::Done,
        };
        ctx.transition(next);
        Ok(())
    }

    /// Answer the COI question for the document on screen
    #[instrument(skip_all, fields(session_id = %ctx.session_id, conflict = conflict.as_str()))]
    pub async fn decide_coi(&self, ctx: &mut SessionContext, conflict: Conflict) -> Result<()> {
        let document_id = match &ctx.phase {
            ReviewPhase::CoiScreening { document } => document.document_id,
            _ => return Err(invalid(ctx, "declare a conflict")),
        };

        self.engine
            .record_coi_decision(ctx.reviewer.reviewer_id, document_id, conflict)
            .await?;

        ctx.transition(ReviewPhase::Selecting);
        self.advance(ctx).await
    }

    /// Set one numeric criterion from raw input
    ///
    /// `ReviewField::Comments` is routed to [`Self::set_comments`].
    pub fn set_score(&self, ctx: &mut SessionContext, field: ReviewField, raw: &str) -> Result<()> {
        if field == ReviewField::Comments {
            return self.set_comments(ctx, raw);
        }

        let draft = draft_mut(ctx, "enter a score")?;
        let score: Score = raw.parse()?;
        match field {
            ReviewField::Alignment => draft.alignment = Some(score),
            ReviewField::Science => draft.science = Some(score),
            ReviewField::Benefits => draft.benefits = Some(score),
            ReviewField::Comments => {}
        }
        Ok(())
    }

    /// Set the free-text comment; blank input clears it
    ///
    /// The text is stored as entered.
    pub fn set_comments(&self, ctx: &mut SessionContext, text: &str) -> Result<()> {
        let draft = draft_mut(ctx, "enter comments")?;
        draft.comments = if text.trim().is_empty() {
            None
        } else {
            Some(text.to_string())
        };
        Ok(())
    }

    /// Write the draft to the store
    ///
    /// An incomplete draft is rejected with every missing field named. The
    /// session only moves to `Submitted` once the store accepted the write.
    #[instrument(skip_all, fields(session_id = %ctx.session_id))]
    pub async fn commit(&self, ctx: &mut SessionContext) -> Result<ReviewResponse> {
        let (document_id, draft, mode) = match &ctx.phase {
            ReviewPhase::Scoring {
                document,
                draft,
                mode,
            } => (document.document_id, draft, *mode),
            _ => return Err(invalid(ctx, "commit")),
        };

        let (scores, comments) = draft.complete()?;
        let reviewer_id = ctx.reviewer.reviewer_id;

        let response = match mode {
            SubmissionMode::Insert => {
                self.engine
                    .submit_response(reviewer_id, document_id, scores, &comments)
                    .await?
            }
            SubmissionMode::UpdateLatest { .. } => {
                self.engine
                    .update_response(reviewer_id, document_id, scores, &comments)
                    .await?
            }
        };

        ctx.transition(ReviewPhase::Submitted {
            response: response.clone(),
            mode,
        });
        Ok(response)
    }

    /// Continue after a submission
    #[instrument(skip_all, fields(session_id = %ctx.session_id))]
    pub async fn next(&self, ctx: &mut SessionContext) -> Result<()> {
        if !matches!(ctx.phase, ReviewPhase::Submitted { .. }) {
            return Err(invalid(ctx, "move on"));
        }
        ctx.transition(ReviewPhase::Selecting);
        self.advance(ctx).await
    }

    /// Load the most recent response back into the form for editing
    ///
    /// Any unsaved draft on screen is discarded; that document stays in the
    /// reviewer's pool. Fails with `NoPriorRecord` when nothing was submitted.
    #[instrument(skip_all, fields(session_id = %ctx.session_id))]
    pub async fn redo(&self, ctx: &mut SessionContext) -> Result<()> {
        if !matches!(
            ctx.phase,
            ReviewPhase::Selecting | ReviewPhase::Scoring { .. } | ReviewPhase::Submitted { .. }
        ) {
            return Err(invalid(ctx, "redo"));
        }

        let latest = self.engine.latest_response(ctx.reviewer.reviewer_id).await?;
        let screening_order = latest.response.screening_order;

        ctx.transition(ReviewPhase::Scoring {
            draft: ScoreDraft::from_response(&latest.response),
            document: latest.document,
            mode: SubmissionMode::UpdateLatest { screening_order },
        });
        Ok(())
    }

    /// Start the reviewer over: delete their responses and select again
    ///
    /// COI decisions are kept, so screening is not repeated.
    #[instrument(skip_all, fields(session_id = %ctx.session_id))]
    pub async fn refresh_user(&self, ctx: &mut SessionContext) -> Result<u64> {
        if !matches!(ctx.phase, ReviewPhase::Done) {
            return Err(invalid(ctx, "restart"));
        }

        let deleted = self.engine.reset_reviewer(ctx.reviewer.reviewer_id).await?;

        ctx.transition(ReviewPhase::Selecting);
        self.advance(ctx).await?;
        Ok(deleted)
    }

    /// Counters and current document for display
    pub async fn view(&self, ctx: &SessionContext) -> Result<SessionView> {
        let reviewer_id = ctx.reviewer.reviewer_id;
        let coi = self.engine.coi_progress(reviewer_id).await?;
        let reviews = self.engine.review_progress(reviewer_id).await?;

        let draft = match &ctx.phase {
            ReviewPhase::Scoring { draft, .. } => Some(draft.clone()),
            _ => None,
        };
        let done = matches!(ctx.phase, ReviewPhase::Done);

        Ok(SessionView {
            session_id: ctx.session_id,
            reviewer_name: ctx.reviewer.reviewer_name.clone(),
            phase: ctx.phase.label(),
            document: ctx.phase.document().cloned(),
            draft,
            coi,
            reviews,
            review_complete: done,
            redo_available: reviews.completed > 0 && coi.is_complete() && !done,
        })
    }
}

fn invalid(ctx: &SessionContext, action: &'static str) -> anyhow::Error {
    ScreenerError::InvalidTransition {
        phase: ctx.phase.label(),
        action,
    }
    .into()
}

fn draft_mut<'a>(
    ctx: &'a mut SessionContext,
    action: &'static str,
) -> Result<&'a mut ScoreDraft> {
    let phase = ctx.phase.label();
    match &mut ctx.phase {
        ReviewPhase::Scoring { draft, .. } => Ok(draft),
        _ => Err(ScreenerError::InvalidTransition { phase, action }.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(v: u8) -> Option<Score> {
        Score::new(v)
    }

    #[test]
    fn test_empty_draft_reports_every_field_in_order() {
        let draft = ScoreDraft::default();
        assert_eq!(draft.missing_fields(), ReviewField::ALL.to_vec());
    }

    #[test]
    fn test_draft_reports_only_missing_fields() {
        let draft = ScoreDraft {
            alignment: score(2),
            science: None,
            benefits: score(4),
            comments: None,
        };
        assert_eq!(
            draft.missing_fields(),
            vec![ReviewField::Science, ReviewField::Comments]
        );

        let err = draft.complete().unwrap_err();
        assert!(matches!(
            err,
            ScreenerError::IncompleteReview { ref missing }
                if missing == &[ReviewField::Science, ReviewField::Comments]
        ));
    }

    #[test]
    fn test_complete_draft() {
        let draft = ScoreDraft {
            alignment: score(1),
            science: score(2),
            benefits: score(3),
            comments: Some("Fluid dynamics".to_string()),
        };
        assert!(draft.missing_fields().is_empty());

        let (scores, comments) = draft.complete().unwrap();
        assert_eq!(scores.science.value(), 2);
        assert_eq!(comments, "Fluid dynamics");
    }

    #[test]
    fn test_draft_from_response_round_trips_fields() {
        let response = ReviewResponse {
            reviewer_id: sdk::types::ReviewerId(1),
            document_id: sdk::types::DocumentId(7),
            scores: Scores {
                alignment: Score::new(4).unwrap(),
                science: Score::new(3).unwrap(),
                benefits: Score::new(2).unwrap(),
            },
            comments: "Rheology; polymers".to_string(),
            screening_order: 5,
        };

        let draft = ScoreDraft::from_response(&response);
        let (scores, comments) = draft.complete().unwrap();
        assert_eq!(scores, response.scores);
        assert_eq!(comments, response.comments);
    }

    #[test]
    fn test_phase_labels() {
        assert_eq!(ReviewPhase::Selecting.label(), "selecting");
        assert_eq!(ReviewPhase::Done.label(), "done");
        assert!(ReviewPhase::Done.document().is_none());
    }
}

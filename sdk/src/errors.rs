//! Error types and handling
//!
//! This module provides the error types used throughout the screener.
//! All errors implement the `ScreenerErrorExt` trait which provides
//! user-friendly hints and indicates whether errors are recoverable.
//!
//! # Security
//!
//! Hints are static strings. They never echo access keys, file paths or
//! free-text comments back to the user.

use thiserror::Error;

use crate::types::{DocumentId, ReviewField, ReviewerId};

/// Trait for screener error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information.
pub trait ScreenerErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors are rejected inputs the user can correct and resubmit,
    /// or writes that failed without leaving anything behind. Non-recoverable
    /// errors need an operator (broken config, malformed catalog).
    fn is_recoverable(&self) -> bool;
}

/// Main screener error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Database**: SQLite operation failures
/// - **Catalog**: Unknown reviewers/documents, malformed import files
/// - **Validation**: Malformed scores, missing form fields
/// - **Assignment**: Submissions the assignment rules refuse
/// - **Workflow**: Actions not valid in the current session phase
/// - **Access**: Shared-secret gate failures
///
/// # Examples
///
/// ```
/// use screener_sdk::errors::{ScreenerError, ScreenerErrorExt};
///
/// let error = ScreenerError::NoPriorRecord;
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal_error = ScreenerError::Config("unknown log level".to_string());
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum ScreenerError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // Catalog errors
    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Reviewer not found: {0}")]
    ReviewerNotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(DocumentId),

    // Validation errors
    #[error("Invalid score '{0}': must be a whole number from 1 to 4")]
    InvalidScore(String),

    #[error("Invalid conflict decision '{0}': must be YES or NO")]
    InvalidConflict(String),

    #[error("Incomplete review, missing: {}", join_fields(.missing))]
    IncompleteReview { missing: Vec<ReviewField> },

    // Assignment errors
    #[error("No previous record found for redo operation")]
    NoPriorRecord,

    #[error("Reviewer {reviewer_id} already reviewed document {document_id}")]
    DuplicateResponse {
        reviewer_id: ReviewerId,
        document_id: DocumentId,
    },

    #[error("Document {document_id} already has {count} of {cap} reviews")]
    DocumentAtCapacity {
        document_id: DocumentId,
        count: i64,
        cap: u32,
    },

    #[error("Reviewer {reviewer_id} completed {count} of {required} required reviews")]
    ReviewQuotaReached {
        reviewer_id: ReviewerId,
        count: i64,
        required: u32,
    },

    #[error("Reviewer {reviewer_id} declared a conflict of interest with document {document_id}")]
    ConflictOfInterest {
        reviewer_id: ReviewerId,
        document_id: DocumentId,
    },

    #[error("Reviewer {reviewer_id} has not screened document {document_id} for conflicts")]
    CoiNotScreened {
        reviewer_id: ReviewerId,
        document_id: DocumentId,
    },

    #[error("Conflict of interest screening incomplete: {screened} of {total}")]
    CoiScreeningIncomplete { screened: i64, total: i64 },

    #[error("Document {document_id} is not the most recent response of reviewer {reviewer_id}")]
    RedoTargetMismatch {
        reviewer_id: ReviewerId,
        document_id: DocumentId,
    },

    // Workflow errors
    #[error("Cannot {action} while {phase}")]
    InvalidTransition {
        phase: &'static str,
        action: &'static str,
    },

    // Access errors
    #[error("Access denied")]
    AccessDenied,

    #[error("Access key not configured: {0}")]
    AccessKeyNotConfigured(String),
}

fn join_fields(fields: &[ReviewField]) -> String {
    fields
        .iter()
        .map(|f| f.label())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ScreenerErrorExt for ScreenerError {
    fn user_hint(&self) -> &str {
        match self {
            // Configuration errors
            Self::Config(_) => "Check your config.toml file for errors",

            // Database errors
            Self::Database(_) => "Database operation failed. Nothing was saved; try again",

            // Catalog errors
            Self::Catalog(_) => "The catalog file is malformed. Check ids and required fields",
            Self::ReviewerNotFound(_) => "Select a registered reviewer name",
            Self::DocumentNotFound(_) => "The requested document is not in the catalog",

            // Validation errors
            Self::InvalidScore(_) => "Enter a score from 1 to 4",
            Self::InvalidConflict(_) => "Answer YES or NO",
            Self::IncompleteReview { .. } => "Fill in every score and the area of expertise",

            // Assignment errors
            Self::NoPriorRecord => "There is no previous record to redo yet",
            Self::DuplicateResponse { .. } => "This document was already reviewed by you",
            Self::DocumentAtCapacity { .. } => {
                "This document has enough reviews. Move to the next document"
            }
            Self::ReviewQuotaReached { .. } => "You have completed all required reviews",
            Self::ConflictOfInterest { .. } => "You declared a conflict with this document",
            Self::CoiNotScreened { .. } => "Screen this document for conflicts first",
            Self::CoiScreeningIncomplete { .. } => {
                "Complete conflict of interest screening before reviewing"
            }
            Self::RedoTargetMismatch { .. } => "Only the most recent record can be redone",

            // Workflow errors
            Self::InvalidTransition { .. } => "That action is not available right now",

            // Access errors
            Self::AccessDenied => "Incorrect password. Try again",
            Self::AccessKeyNotConfigured(_) => "Access key is not configured on this server",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::Config(_)
            | Self::Catalog(_)
            | Self::AccessKeyNotConfigured(_) => false,

            // Rejected inputs the user can correct, and failed writes that
            // left nothing behind and can be retried
            _ => true,
        }
    }
}

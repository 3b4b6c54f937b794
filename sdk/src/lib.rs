//! Screener SDK
//!
//! Shared library providing the domain types and error handling used by the
//! review-assignment engine and its front ends.

/// Error types and handling
pub mod errors;

/// Documents, reviewers, COI decisions and review responses
pub mod types;

// Re-export commonly used types
pub use errors::{ScreenerError, ScreenerErrorExt};
pub use types::{
    CoiDecision, Conflict, Document, DocumentId, ReviewField, ReviewResponse, Reviewer,
    ReviewerId, Score, Scores,
};

//! Domain types shared between the engine and its front ends

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ScreenerError;

/// Newtype for a document identifier to prevent mixing with reviewer ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub i64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for DocumentId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Newtype for a reviewer identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewerId(pub i64);

impl fmt::Display for ReviewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ReviewerId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A reviewable submission (an abstract plus its applicant details).
///
/// Documents are reference data: loaded once per review cycle and never
/// mutated by the review workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub document_id: DocumentId,
    pub first_name: String,
    pub last_name: String,
    pub institution: String,
    #[serde(default)]
    pub coauthors: Option<String>,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub biosketch: String,
    #[serde(default)]
    pub leverage_plan: String,
    #[serde(default)]
    pub early_career: bool,
    #[serde(default)]
    pub student: bool,
}

impl Document {
    /// Lead author as "First Last".
    pub fn lead_author(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Coauthor list, or "NA" when none were given.
    pub fn coauthors_or_na(&self) -> &str {
        match self.coauthors.as_deref() {
            Some(c) if !c.trim().is_empty() => c,
            _ => "NA",
        }
    }
}

/// A registered reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reviewer {
    pub reviewer_id: ReviewerId,
    pub reviewer_name: String,
}

/// Outcome of a conflict-of-interest screening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Conflict {
    Yes,
    No,
}

impl Conflict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Conflict::Yes => "YES",
            Conflict::No => "NO",
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Conflict {
    type Err = ScreenerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "YES" | "Y" => Ok(Conflict::Yes),
            "NO" | "N" => Ok(Conflict::No),
            other => Err(ScreenerError::InvalidConflict(other.to_string())),
        }
    }
}

/// One row of the COI ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoiDecision {
    pub reviewer_id: ReviewerId,
    pub document_id: DocumentId,
    pub conflict: Conflict,
    pub decided_at: i64,
}

/// A single criterion score, always within 1..=4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Score(u8);

impl Score {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 4;

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Score {
    type Error = ScreenerError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .and_then(Score::new)
            .ok_or_else(|| ScreenerError::InvalidScore(value.to_string()))
    }
}

impl From<Score> for i64 {
    fn from(score: Score) -> Self {
        i64::from(score.0)
    }
}

impl FromStr for Score {
    type Err = ScreenerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        trimmed
            .parse::<u8>()
            .ok()
            .and_then(Score::new)
            .ok_or_else(|| ScreenerError::InvalidScore(trimmed.to_string()))
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three numeric review criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    pub alignment: Score,
    pub science: Score,
    pub benefits: Score,
}

/// A submitted review of one document by one reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub reviewer_id: ReviewerId,
    pub document_id: DocumentId,
    pub scores: Scores,
    pub comments: String,
    pub screening_order: i64,
}

/// Form fields a reviewer fills in, in the order they are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewField {
    Alignment,
    Science,
    Benefits,
    Comments,
}

impl ReviewField {
    pub const ALL: [ReviewField; 4] = [
        ReviewField::Alignment,
        ReviewField::Science,
        ReviewField::Benefits,
        ReviewField::Comments,
    ];

    /// Human-facing label of the field.
    pub fn label(&self) -> &'static str {
        match self {
            ReviewField::Alignment => "Alignment with workshop goals",
            ReviewField::Science => "Advancing MSD science",
            ReviewField::Benefits => "Benefits to attendee",
            ReviewField::Comments => "Area of expertise",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewField::Alignment => "alignment",
            ReviewField::Science => "science",
            ReviewField::Benefits => "benefits",
            ReviewField::Comments => "comments",
        }
    }
}

impl fmt::Display for ReviewField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

//! Integration tests for the assignment engine
//!
//! Covers the exclusion rules, the per-document cap, the per-reviewer quota,
//! COI screening exhaustion and redo behavior against a real SQLite file.

use std::collections::HashSet;
use std::sync::Arc;

use screener_engine::assignment::AssignmentEngine;
use screener_engine::catalog::Catalog;
use screener_engine::config::ReviewLimits;
use screener_engine::db::Database;
use sdk::errors::ScreenerError;
use sdk::types::{Conflict, Document, DocumentId, Reviewer, ReviewerId, Score, Scores};
use tempfile::TempDir;
use tokio::task::JoinSet;

fn document(id: i64) -> Document {
    Document {
        document_id: DocumentId(id),
        first_name: "Rosalind".to_string(),
        last_name: format!("Franklin{}", id),
        institution: "King's College".to_string(),
        coauthors: Some("R. Gosling".to_string()),
        title: format!("Submission {}", id),
        abstract_text: "An abstract".to_string(),
        biosketch: "A biosketch".to_string(),
        leverage_plan: "A plan".to_string(),
        early_career: id % 2 == 0,
        student: false,
    }
}

fn scores(v: u8) -> Scores {
    let s = Score::new(v).unwrap();
    Scores {
        alignment: s,
        science: s,
        benefits: s,
    }
}

async fn setup(docs: i64, reviewers: i64) -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("screener.db"))
        .await
        .unwrap();

    let catalog = Catalog {
        documents: (1..=docs).map(document).collect(),
        reviewers: (1..=reviewers)
            .map(|id| Reviewer {
                reviewer_id: ReviewerId(id),
                reviewer_name: format!("Reviewer {}", id),
            })
            .collect(),
    };
    catalog.import(&db).await.unwrap();

    (temp_dir, db)
}

fn engine(db: &Database, max_per_document: u32, required: u32) -> AssignmentEngine {
    AssignmentEngine::new(
        db,
        ReviewLimits {
            max_reviews_per_document: max_per_document,
            required_reviews: required,
        },
    )
}

/// Screen every document for `reviewer`, declaring a conflict on `conflicts`
async fn screen_all(engine: &AssignmentEngine, reviewer: ReviewerId, conflicts: &[i64]) {
    while let Some(doc) = engine.next_document_for_coi(reviewer).await.unwrap() {
        let conflict = if conflicts.contains(&doc.document_id.0) {
            Conflict::Yes
        } else {
            Conflict::No
        };
        engine
            .record_coi_decision(reviewer, doc.document_id, conflict)
            .await
            .unwrap();
    }
}

fn rejection(err: &anyhow::Error) -> &ScreenerError {
    err.downcast_ref::<ScreenerError>()
        .expect("expected a ScreenerError")
}

#[tokio::test]
async fn test_quota_reached_before_pool_is_empty() {
    // max_reviews_per_reviewer = 2, five eligible documents, cap 3
    let (_dir, db) = setup(5, 1).await;
    let engine = engine(&db, 3, 2);
    let r = ReviewerId(1);
    screen_all(&engine, r, &[]).await;

    for _ in 0..2 {
        let doc = engine.next_document_for_review(r).await.unwrap().unwrap();
        engine
            .submit_response(r, doc.document_id, scores(3), "expertise")
            .await
            .unwrap();
    }

    assert!(engine.next_document_for_review(r).await.unwrap().is_none());
    assert_eq!(db.responses().count_for_reviewer(r).await.unwrap(), 2);
}

#[tokio::test]
async fn test_capped_document_never_assigned() {
    // Document 1 already holds 3 responses with a cap of 3
    let (_dir, db) = setup(2, 4).await;
    let engine = engine(&db, 3, 15);

    for r in 1..=3 {
        let r = ReviewerId(r);
        screen_all(&engine, r, &[]).await;
        engine
            .submit_response(r, DocumentId(1), scores(2), "x")
            .await
            .unwrap();
    }

    let fourth = ReviewerId(4);
    screen_all(&engine, fourth, &[]).await;
    for _ in 0..20 {
        let doc = engine.next_document_for_review(fourth).await.unwrap();
        assert_eq!(doc.map(|d| d.document_id), Some(DocumentId(2)));
    }

    let err = engine
        .submit_response(fourth, DocumentId(1), scores(2), "x")
        .await
        .unwrap_err();
    assert!(matches!(
        rejection(&err),
        ScreenerError::DocumentAtCapacity { count: 3, cap: 3, .. }
    ));
    assert_eq!(
        db.responses().count_for_document(DocumentId(1)).await.unwrap(),
        3
    );
}

#[tokio::test]
async fn test_coi_screening_walks_every_document_once() {
    // Ten documents, none screened
    let (_dir, db) = setup(10, 1).await;
    let engine = engine(&db, 3, 15);
    let r = ReviewerId(1);

    let mut seen = HashSet::new();
    for call in 0..10 {
        let progress = engine.coi_progress(r).await.unwrap();
        assert_eq!(progress.screened, call);
        assert!(!progress.is_complete());

        let doc = engine.next_document_for_coi(r).await.unwrap().unwrap();
        assert!(seen.insert(doc.document_id), "document offered twice");
        engine
            .record_coi_decision(r, doc.document_id, Conflict::No)
            .await
            .unwrap();
    }

    assert!(engine.next_document_for_coi(r).await.unwrap().is_none());
    assert!(engine.coi_progress(r).await.unwrap().is_complete());
}

#[tokio::test]
async fn test_conflicted_document_never_offered_for_review() {
    let (_dir, db) = setup(3, 1).await;
    let engine = engine(&db, 3, 15);
    let r = ReviewerId(1);
    screen_all(&engine, r, &[2]).await;

    let mut reviewed = Vec::new();
    while let Some(doc) = engine.next_document_for_review(r).await.unwrap() {
        assert_ne!(doc.document_id, DocumentId(2));
        engine
            .submit_response(r, doc.document_id, scores(1), "x")
            .await
            .unwrap();
        reviewed.push(doc.document_id.0);
    }

    reviewed.sort_unstable();
    assert_eq!(reviewed, vec![1, 3]);
}

#[tokio::test]
async fn test_review_blocked_while_screening_open() {
    let (_dir, db) = setup(3, 1).await;
    let engine = engine(&db, 3, 15);
    let r = ReviewerId(1);

    let doc = engine.next_document_for_coi(r).await.unwrap().unwrap();
    engine
        .record_coi_decision(r, doc.document_id, Conflict::No)
        .await
        .unwrap();

    let err = engine.next_document_for_review(r).await.unwrap_err();
    assert!(matches!(
        rejection(&err),
        ScreenerError::CoiScreeningIncomplete {
            screened: 1,
            total: 3
        }
    ));
}

#[tokio::test]
async fn test_completion_is_sticky_until_reset() {
    let (_dir, db) = setup(2, 1).await;
    let engine = engine(&db, 3, 15);
    let r = ReviewerId(1);
    screen_all(&engine, r, &[]).await;

    while let Some(doc) = engine.next_document_for_review(r).await.unwrap() {
        engine
            .submit_response(r, doc.document_id, scores(4), "x")
            .await
            .unwrap();
    }

    for _ in 0..5 {
        assert!(engine.next_document_for_review(r).await.unwrap().is_none());
    }

    let deleted = engine.reset_reviewer(r).await.unwrap();
    assert_eq!(deleted, 2);
    assert!(engine.next_document_for_review(r).await.unwrap().is_some());
    // Screening is not repeated after a reset
    assert!(engine.next_document_for_coi(r).await.unwrap().is_none());
}

#[tokio::test]
async fn test_redo_keeps_document_and_order() {
    let (_dir, db) = setup(3, 1).await;
    let engine = engine(&db, 3, 15);
    let r = ReviewerId(1);
    screen_all(&engine, r, &[]).await;

    let first = engine
        .submit_response(r, DocumentId(3), scores(1), "first")
        .await
        .unwrap();
    let second = engine
        .submit_response(r, DocumentId(1), scores(1), "second")
        .await
        .unwrap();
    assert_eq!((first.screening_order, second.screening_order), (1, 2));

    let latest = engine.latest_response(r).await.unwrap();
    assert_eq!(latest.response.document_id, DocumentId(1));

    let updated = engine
        .update_response(r, DocumentId(1), scores(4), "second, revised")
        .await
        .unwrap();
    assert_eq!(updated.document_id, DocumentId(1));
    assert_eq!(updated.screening_order, 2);

    let rows = db.responses().list_for_reviewer(r).await.unwrap();
    let orders: Vec<_> = rows.iter().map(|row| row.response.screening_order).collect();
    assert_eq!(orders, vec![1, 2]);
    assert_eq!(rows[0].response.comments, "first");
    assert_eq!(rows[0].response.scores, scores(1));
    assert_eq!(rows[1].response.comments, "second, revised");
    assert_eq!(rows[1].response.scores, scores(4));
}

#[tokio::test]
async fn test_redo_with_no_prior_record() {
    let (_dir, db) = setup(1, 1).await;
    let engine = engine(&db, 3, 15);
    let r = ReviewerId(1);
    screen_all(&engine, r, &[]).await;

    let err = engine.latest_response(r).await.unwrap_err();
    assert!(matches!(rejection(&err), ScreenerError::NoPriorRecord));

    let err = engine
        .update_response(r, DocumentId(1), scores(2), "x")
        .await
        .unwrap_err();
    assert!(matches!(rejection(&err), ScreenerError::NoPriorRecord));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_never_exceed_cap() {
    // Five reviewers race for a document with room for two responses
    let (_dir, db) = setup(1, 5).await;
    let engine = Arc::new(engine(&db, 2, 15));
    for r in 1..=5 {
        screen_all(&engine, ReviewerId(r), &[]).await;
    }

    let mut tasks = JoinSet::new();
    for r in 1..=5 {
        let engine = Arc::clone(&engine);
        tasks.spawn(async move {
            engine
                .submit_response(ReviewerId(r), DocumentId(1), scores(2), "race")
                .await
        });
    }

    let mut accepted = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) => accepted += 1,
            Err(err) => assert!(matches!(
                rejection(&err),
                ScreenerError::DocumentAtCapacity { .. }
            )),
        }
    }

    assert_eq!(accepted, 2);
    assert_eq!(
        db.responses().count_for_document(DocumentId(1)).await.unwrap(),
        2
    );
}

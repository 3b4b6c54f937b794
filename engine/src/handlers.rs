//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - init: Create the database
//! - import: Load the document and reviewer catalog
//! - review: Interactive review session (reviewer key)
//! - status: Progress counters for one reviewer
//! - admin: Response listings, progress board, resets (admin key)

use anyhow::{Context, Result};
use sdk::errors::ScreenerError;
use serde_json::json;
use std::path::Path;

use crate::access::{AccessGate, AccessRole, SecretString};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::console::{sanitize, Console};
use crate::db::{Database, ReviewedDocument, ReviewerProgress, TruncateSummary};
use crate::workflow::ReviewWorkflow;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

async fn open_database(config: &Config) -> Result<Database> {
    Database::new(&config.database_path())
        .await
        .context("Failed to open database")
}

/// Prompt for the key of `role` on the terminal and check it
fn authorize(config: &Config, role: AccessRole) -> Result<()> {
    let gate = AccessGate::from_env(&config.access);

    let prompt = format!("Enter the {} key: ", role);
    let supplied = rpassword::read_password_from_tty(Some(prompt.as_str()))
        .map(SecretString::from)
        .context("Failed to read access key")?;

    gate.verify(role, &supplied)?;
    Ok(())
}

/// Create the database file and schema
pub async fn handle_init(config: &Config, format: OutputFormat) -> Result<()> {
    let path = config.database_path();
    let database = open_database(config).await?;
    database.close().await?;

    match format {
        OutputFormat::Text => println!("Database ready at {}", path.display()),
        OutputFormat::Json => {
            let output = json!({ "database": path });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Load a catalog file into the database
pub async fn handle_import(file: &Path, config: &Config, format: OutputFormat) -> Result<()> {
    let catalog = Catalog::load(file)?;

    let database = open_database(config).await?;
    let summary = catalog.import(&database).await?;
    database.close().await?;

    match format {
        OutputFormat::Text => println!(
            "Imported {} documents and {} reviewers",
            summary.documents, summary.reviewers
        ),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }

    Ok(())
}

/// Run an interactive review session on stdin/stdout
pub async fn handle_review(reviewer: &str, config: &Config) -> Result<()> {
    authorize(config, AccessRole::Reviewer)?;

    let database = open_database(config).await?;
    let workflow = ReviewWorkflow::new(&database, config.review.limits());
    let mut ctx = workflow.start(reviewer).await?;

    {
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        let mut console = Console::new(&workflow, stdin.lock(), stdout.lock());
        console.run(&mut ctx).await?;
    }

    database.close().await
}

/// Show the counters a session would start with
pub async fn handle_status(reviewer: &str, config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_database(config).await?;
    let workflow = ReviewWorkflow::new(&database, config.review.limits());

    let ctx = workflow.start(reviewer).await?;
    let view = workflow.view(&ctx).await?;

    match format {
        OutputFormat::Text => {
            println!("Reviewer: {}", view.reviewer_name);
            println!("  COI screening: {}/{}", view.coi.screened, view.coi.total);
            println!(
                "  Reviews:       {}/{}",
                view.reviews.completed, view.reviews.required
            );
            println!("  Phase:         {}", view.phase);
            println!(
                "  Complete:      {}",
                if view.review_complete { "yes" } else { "no" }
            );
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view)?),
    }

    database.close().await
}

/// All responses, or one reviewer's responses in screening order
pub async fn list_responses(
    database: &Database,
    reviewer: Option<&str>,
) -> Result<Vec<ReviewedDocument>> {
    match reviewer {
        Some(name) => {
            let reviewer = database
                .reviewers()
                .get_by_name(name)
                .await?
                .ok_or_else(|| ScreenerError::ReviewerNotFound(name.to_string()))?;
            database
                .responses()
                .list_for_reviewer(reviewer.reviewer_id)
                .await
        }
        None => database.responses().list_all().await,
    }
}

pub async fn handle_admin_responses(
    reviewer: Option<&str>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    authorize(config, AccessRole::Admin)?;

    let database = open_database(config).await?;
    let rows = list_responses(&database, reviewer).await?;

    match format {
        OutputFormat::Text => {
            if rows.is_empty() {
                println!("No responses");
            }
            for row in &rows {
                let r = &row.response;
                println!(
                    "{} #{}  [{}] {}",
                    row.reviewer_name,
                    r.screening_order,
                    r.document_id,
                    sanitize(&row.document.title)
                );
                println!(
                    "    alignment {}  science {}  benefits {}  expertise: {}",
                    r.scores.alignment,
                    r.scores.science,
                    r.scores.benefits,
                    sanitize(&r.comments)
                );
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "responses": rows,
                "count": rows.len(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await
}

/// Progress of every reviewer against the per-reviewer quota
///
/// `required` matches what review sessions enforce, so the board and
/// `status` agree when `required_reviews` overrides the quota.
pub async fn reviewer_progress(
    database: &Database,
    config: &Config,
) -> Result<Vec<ReviewerProgress>> {
    database
        .responses()
        .progress(
            config.review.limits().required_reviews,
            config.review.max_reviews_per_reviewer,
        )
        .await
}

pub async fn handle_admin_progress(config: &Config, format: OutputFormat) -> Result<()> {
    authorize(config, AccessRole::Admin)?;

    let database = open_database(config).await?;
    let progress = reviewer_progress(&database, config).await?;

    match format {
        OutputFormat::Text => {
            println!("Reviewer progress:");
            for p in &progress {
                println!(
                    "  {:<30} {:>3}/{:<3} {:>4.0}% of quota {}",
                    p.reviewer_name,
                    p.completed,
                    p.required,
                    p.fraction_complete * 100.0,
                    p.quota
                );
            }
        }
        OutputFormat::Json => {
            let output = json!({ "reviewers": progress });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await
}

pub async fn handle_admin_reset(yes: bool, config: &Config, format: OutputFormat) -> Result<()> {
    if !yes {
        anyhow::bail!("Refusing to delete all review activity without --yes");
    }
    authorize(config, AccessRole::Admin)?;

    let database = open_database(config).await?;
    let summary: TruncateSummary = database.truncate_activity().await?;

    match format {
        OutputFormat::Text => println!(
            "Deleted {} responses and {} COI decisions",
            summary.responses, summary.coi_decisions
        ),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }

    database.close().await
}

/// Delete one reviewer's responses, keeping their COI decisions
pub async fn refresh_reviewer(database: &Database, name: &str) -> Result<u64> {
    let reviewer = database
        .reviewers()
        .get_by_name(name)
        .await?
        .ok_or_else(|| ScreenerError::ReviewerNotFound(name.to_string()))?;

    database
        .responses()
        .delete_for_reviewer(reviewer.reviewer_id)
        .await
}

pub async fn handle_admin_refresh_user(
    reviewer: &str,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    authorize(config, AccessRole::Admin)?;

    let database = open_database(config).await?;
    let deleted = refresh_reviewer(&database, reviewer).await?;

    match format {
        OutputFormat::Text => println!("Deleted {} responses for {}", deleted, reviewer),
        OutputFormat::Json => {
            let output = json!({ "reviewer": reviewer, "deleted": deleted });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await
}

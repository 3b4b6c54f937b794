//! Line-oriented review console
//!
//! Drives a [`ReviewWorkflow`] session over any `BufRead`/`Write` pair, so the
//! same loop serves the terminal and tests. Rejected input is reported with
//! its hint and re-prompted. A write the store could not complete is reported
//! the same way and the draft is kept; any other failure ends the session.
//!
//! Commands accepted at every prompt except the free-text comment: `quit`.
//! At the score prompts and before commit: `redo`. After a submission:
//! `next`, `redo`. Once done: `restart`.
//!
//! Free text from the catalog and from comments is sanitized for display
//! only; the store keeps it as entered.

use anyhow::Result;
use sdk::errors::{ScreenerError, ScreenerErrorExt};
use sdk::types::{Conflict, Document, ReviewField};
use std::io::{BufRead, Write};

use crate::workflow::{ReviewPhase, ReviewWorkflow, SessionContext, SubmissionMode};

/// Make free text safe for single-line display
pub fn sanitize(text: &str) -> String {
    text.replace(';', ",")
        .replace("\r\n", ". ")
        .replace(['\n', '\r'], ". ")
}

enum Step {
    Continue,
    Quit,
}

pub struct Console<'a, R, W> {
    workflow: &'a ReviewWorkflow,
    input: R,
    output: W,
}

impl<'a, R: BufRead, W: Write> Console<'a, R, W> {
    pub fn new(workflow: &'a ReviewWorkflow, input: R, output: W) -> Self {
        Self {
            workflow,
            input,
            output,
        }
    }

    /// Run until the reviewer quits or input ends
    pub async fn run(&mut self, ctx: &mut SessionContext) -> Result<()> {
        writeln!(
            self.output,
            "Welcome, {}.",
            sanitize(&ctx.reviewer.reviewer_name)
        )?;

        loop {
            let step = match ctx.phase() {
                ReviewPhase::CoiScreening { document } => {
                    let document = document.clone();
                    self.coi_step(ctx, &document).await?
                }
                ReviewPhase::Scoring { .. } => self.scoring_step(ctx).await?,
                ReviewPhase::Submitted { .. } => self.submitted_step(ctx).await?,
                ReviewPhase::Done => self.done_step(ctx).await?,
                ReviewPhase::Selecting => {
                    let result = self.workflow.advance(ctx).await;
                    self.recover(result)?;
                    Step::Continue
                }
            };

            if let Step::Quit = step {
                writeln!(self.output, "Session closed.")?;
                return Ok(());
            }
        }
    }

    async fn coi_step(&mut self, ctx: &mut SessionContext, document: &Document) -> Result<Step> {
        let view = self.workflow.view(ctx).await?;
        writeln!(self.output)?;
        writeln!(
            self.output,
            "Conflict of interest screening {}/{}",
            view.coi.screened + 1,
            view.coi.total
        )?;
        self.print_summary(document)?;

        let Some(line) = self.prompt("Conflict of interest with these authors? [yes/no]")? else {
            return Ok(Step::Quit);
        };
        if line.eq_ignore_ascii_case("quit") {
            return Ok(Step::Quit);
        }

        match line.parse::<Conflict>() {
            Ok(conflict) => {
                let result = self.workflow.decide_coi(ctx, conflict).await;
                self.recover(result)?;
            }
            Err(e) => self.report(&e)?,
        }
        Ok(Step::Continue)
    }

    async fn scoring_step(&mut self, ctx: &mut SessionContext) -> Result<Step> {
        let (document, mode) = match ctx.phase() {
            ReviewPhase::Scoring { document, mode, .. } => (document.clone(), *mode),
            _ => return Ok(Step::Continue),
        };

        let view = self.workflow.view(ctx).await?;
        writeln!(self.output)?;
        match mode {
            SubmissionMode::Insert => writeln!(
                self.output,
                "Review {}/{}",
                view.reviews.completed + 1,
                view.reviews.required
            )?,
            SubmissionMode::UpdateLatest { screening_order } => writeln!(
                self.output,
                "Editing review #{} (press Enter to keep a value)",
                screening_order
            )?,
        }
        self.print_document(&document)?;

        for field in ReviewField::ALL {
            loop {
                let current = current_value(ctx, field);
                let label = match (&current, field) {
                    (Some(value), _) => format!("{} [{}]", field.label(), sanitize(value)),
                    (None, ReviewField::Comments) => field.label().to_string(),
                    (None, _) => format!("{} (1-4)", field.label()),
                };

                let Some(line) = self.prompt(&label)? else {
                    return Ok(Step::Quit);
                };
                // The comment is free text; "quit" or "redo" there is an answer
                if field != ReviewField::Comments {
                    if line.eq_ignore_ascii_case("quit") {
                        return Ok(Step::Quit);
                    }
                    if line.eq_ignore_ascii_case("redo") {
                        let result = self.workflow.redo(ctx).await;
                        self.recover(result)?;
                        return Ok(Step::Continue);
                    }
                }
                if line.trim().is_empty() && current.is_some() {
                    break;
                }

                if let Err(e) = self.workflow.set_score(ctx, field, &line) {
                    self.report_anyhow(e)?;
                    continue;
                }
                if current_value(ctx, field).is_some() {
                    break;
                }
                writeln!(self.output, "{} is required.", field.label())?;
            }
        }

        loop {
            let Some(line) =
                self.prompt("Type 'commit' to submit, 'redo' to edit your last review, or 'quit'")?
            else {
                return Ok(Step::Quit);
            };

            match line.to_ascii_lowercase().as_str() {
                "commit" => {
                    match self.workflow.commit(ctx).await {
                        Ok(response) => writeln!(
                            self.output,
                            "Review #{} saved.",
                            response.screening_order
                        )?,
                        Err(e) => {
                            let write_failed = matches!(
                                e.downcast_ref::<ScreenerError>(),
                                Some(ScreenerError::Database(_))
                            );
                            self.report_anyhow(e)?;

                            // A failed write keeps the draft for another try;
                            // a draft the assignment rules refused is dropped.
                            if !write_failed {
                                let result = self.workflow.advance(ctx).await;
                                self.recover(result)?;
                            }
                        }
                    }
                    return Ok(Step::Continue);
                }
                "redo" => {
                    let result = self.workflow.redo(ctx).await;
                    self.recover(result)?;
                    return Ok(Step::Continue);
                }
                "quit" => return Ok(Step::Quit),
                other => writeln!(self.output, "Unknown command '{}'.", sanitize(other))?,
            }
        }
    }

    async fn submitted_step(&mut self, ctx: &mut SessionContext) -> Result<Step> {
        let Some(line) = self.prompt("Type 'next' to continue, 'redo' to edit, or 'quit'")? else {
            return Ok(Step::Quit);
        };

        match line.to_ascii_lowercase().as_str() {
            "" | "next" => {
                let result = self.workflow.next(ctx).await;
                self.recover(result)?;
            }
            "redo" => {
                let result = self.workflow.redo(ctx).await;
                self.recover(result)?;
            }
            "quit" => return Ok(Step::Quit),
            other => writeln!(self.output, "Unknown command '{}'.", sanitize(other))?,
        }
        Ok(Step::Continue)
    }

    async fn done_step(&mut self, ctx: &mut SessionContext) -> Result<Step> {
        let view = self.workflow.view(ctx).await?;
        writeln!(self.output)?;
        writeln!(
            self.output,
            "All done: {} of {} reviews submitted. Thank you!",
            view.reviews.completed, view.reviews.required
        )?;

        let Some(line) = self.prompt("Type 'restart' to start over, or 'quit'")? else {
            return Ok(Step::Quit);
        };

        match line.to_ascii_lowercase().as_str() {
            "restart" => {
                let result = self.workflow.refresh_user(ctx).await;
                if let Some(deleted) = self.recover(result)? {
                    writeln!(self.output, "Removed {} reviews.", deleted)?;
                }
                Ok(Step::Continue)
            }
            "" | "quit" => Ok(Step::Quit),
            other => {
                writeln!(self.output, "Unknown command '{}'.", sanitize(other))?;
                Ok(Step::Continue)
            }
        }
    }

    fn print_summary(&mut self, document: &Document) -> Result<()> {
        writeln!(self.output, "  Title:       {}", sanitize(&document.title))?;
        writeln!(
            self.output,
            "  Author:      {}",
            sanitize(&document.lead_author())
        )?;
        writeln!(
            self.output,
            "  Institution: {}",
            sanitize(&document.institution)
        )?;
        writeln!(
            self.output,
            "  Coauthors:   {}",
            sanitize(document.coauthors_or_na())
        )?;
        Ok(())
    }

    fn print_document(&mut self, document: &Document) -> Result<()> {
        self.print_summary(document)?;
        writeln!(
            self.output,
            "  Early career: {}  Student: {}",
            yes_no(document.early_career),
            yes_no(document.student)
        )?;
        writeln!(self.output, "  Abstract:    {}", sanitize(&document.abstract_text))?;
        writeln!(self.output, "  Biosketch:   {}", sanitize(&document.biosketch))?;
        writeln!(
            self.output,
            "  Leverage:    {}",
            sanitize(&document.leverage_plan)
        )?;
        Ok(())
    }

    /// Print `text` and read one line; `None` at end of input
    fn prompt(&mut self, text: &str) -> Result<Option<String>> {
        write!(self.output, "{}: ", text)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\n', '\r']).trim().to_string()))
    }

    /// Turn recoverable rejections into a printed hint, pass everything else up
    fn recover<T>(&mut self, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                self.report_anyhow(e)?;
                Ok(None)
            }
        }
    }

    fn report_anyhow(&mut self, e: anyhow::Error) -> Result<()> {
        match e.downcast_ref::<ScreenerError>() {
            Some(err) if err.is_recoverable() => self.report(err),
            _ => Err(e),
        }
    }

    fn report(&mut self, err: &ScreenerError) -> Result<()> {
        writeln!(self.output, "{}", err)?;
        writeln!(self.output, "Hint: {}", err.user_hint())?;
        Ok(())
    }
}

fn current_value(ctx: &SessionContext, field: ReviewField) -> Option<String> {
    match ctx.phase() {
        ReviewPhase::Scoring { draft, .. } => match field {
            ReviewField::Comments => draft.comments.clone(),
            criterion => draft.get_score(criterion).map(|s| s.to_string()),
        },
        _ => None,
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

//! # rubric-grade
//!
//! Grades student code against a rubric and a model solution by running a
//! fixed sequence of prompts through a text-completion service.
//!
//! The submission is split into units (classes), and each unit then gets its
//! own rubric fragment, a first-pass evaluation, a reviewed evaluation and a
//! list of marks. The marks are summed into a total and everything is written
//! to a plain-text report.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Summing extracted marks
pub mod aggregate;
/// Explicit configuration for a grading run
pub mod config;
/// Reading and normalizing input artifacts
pub mod input;
/// The completion-service abstraction and its OpenAI implementation
pub mod oracle;
/// Best-effort parsers for oracle responses and reports
pub mod parsers;
/// Stage sequencing
pub mod pipeline;
/// Prompt templates
pub mod prompts;
/// Report rendering and parsing
pub mod report;
/// The individual stages
pub mod stages;
/// The state record threaded through the stages
pub mod state;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail, ensure};
use config::GraderConfig;
use oracle::Oracle;
use pipeline::Pipeline;
use state::EvaluationState;
use tabled::{
    Table, Tabled,
    settings::{Panel, Style},
};
use tracing::{error, info};
use uuid::Uuid;

/// Grades one submission end to end: load inputs, run every stage, write the
/// report (and the state dump, if configured).
///
/// Nothing is written unless every stage succeeds.
pub async fn grade<O: Oracle>(oracle: &O, config: &GraderConfig) -> Result<EvaluationState> {
    let run_id = Uuid::new_v4();
    let submission = config.inputs().submission().display().to_string();
    info!(%run_id, %submission, "Grading submission");
    if let Some(path) = config.state_json() {
        ensure!(
            path != config.output(),
            "State dump {} would overwrite the report",
            path.display()
        );
    }

    let state = input::load_state(config.inputs())?;
    let state = Pipeline::new(oracle, config.pipeline().clone())
        .run(state)
        .await
        .with_context(|| format!("Grading {submission} failed (run {run_id})"))?;

    report::write(&state, config.output())?;
    if let Some(path) = config.state_json() {
        report::write_state_json(&state, path)?;
    }
    info!(%run_id, report = %config.output().display(), "Report written");

    Ok(state)
}

/// Outcome of grading one submission in a batch.
#[derive(Debug)]
pub struct BatchEntry {
    /// Submission file.
    pub submission: PathBuf,
    /// Report file written for it.
    pub report:     PathBuf,
    /// Total marks, or the error that stopped grading.
    pub outcome:    Result<f64>,
}

/// One row of the batch overview.
#[derive(Tabled)]
struct BatchRow {
    /// Submission file.
    #[tabled(rename = "Submission")]
    submission: String,
    /// Total marks or `failed`.
    #[tabled(rename = "Total")]
    total:      String,
}

/// Grades every file matching `pattern`, one report per submission in
/// `out_dir`.
///
/// A failing submission is logged and recorded in its entry; the batch only
/// fails if nothing matched or every submission failed.
pub async fn grade_batch<O: Oracle>(
    oracle: &O,
    config: &GraderConfig,
    pattern: &str,
    out_dir: &Path,
) -> Result<Vec<BatchEntry>> {
    let submissions = input::find_submissions(pattern)?;
    if submissions.is_empty() {
        bail!("No submissions matched {pattern}");
    }
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Could not create {}", out_dir.display()))?;

    let names = config::report_names(&submissions);
    let mut entries = Vec::with_capacity(submissions.len());
    for (submission, name) in submissions.into_iter().zip(names) {
        let run_config = config.for_submission(&submission, &name, out_dir);
        let outcome = grade(oracle, &run_config)
            .await
            .map(|state| state.total_marks());
        if let Err(e) = &outcome {
            error!("{e:#}");
        }
        entries.push(BatchEntry {
            submission,
            report: run_config.output().to_path_buf(),
            outcome,
        });
    }

    if entries.iter().all(|entry| entry.outcome.is_err()) {
        bail!("Every submission matching {pattern} failed to grade");
    }
    Ok(entries)
}

/// Renders a batch overview table.
pub fn batch_table(entries: &[BatchEntry]) -> String {
    let rows: Vec<BatchRow> = entries
        .iter()
        .map(|entry| BatchRow {
            submission: entry.submission.display().to_string(),
            total:      match &entry.outcome {
                Ok(total) => format!("{total:.2}"),
                Err(_) => "failed".to_string(),
            },
        })
        .collect();
    let graded = entries.iter().filter(|e| e.outcome.is_ok()).count();

    Table::new(&rows)
        .with(Style::modern())
        .with(Panel::header("Batch Overview"))
        .with(Panel::footer(format!("Graded {graded}/{}", entries.len())))
        .to_string()
}

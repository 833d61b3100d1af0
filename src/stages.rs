#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! The individual pipeline stages.
//!
//! Each stage takes the state by value, adds entries to exactly one map (or
//! sets the total) and returns it. Stages that call the oracle per unit run
//! those calls through a bounded stream and record the results in unit order,
//! so the outcome does not depend on which call finishes first.

use std::fmt;

use futures::{StreamExt, TryStreamExt, stream};
use itertools::Itertools;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{
    aggregate,
    config::PipelineOptions,
    oracle::Oracle,
    parsers::{self, ParseResult},
    prompts,
    state::{EvaluationState, Slot, StateError},
};

/// One step of the grading pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Splits the submission into units.
    UnitExtraction,
    /// Finds the rubric fragment for each unit.
    RubricExtraction,
    /// First-pass evaluation of each unit.
    InitialEvaluation,
    /// Second-pass review of each evaluation.
    ReviewEvaluation,
    /// Pulls marks out of each reviewed evaluation.
    MarksExtraction,
    /// Sums all marks.
    TotalMarks,
}

impl Stage {
    /// All stages, in the order the pipeline runs them.
    pub const ALL: [Stage; 6] = [
        Stage::UnitExtraction,
        Stage::RubricExtraction,
        Stage::InitialEvaluation,
        Stage::ReviewEvaluation,
        Stage::MarksExtraction,
        Stage::TotalMarks,
    ];

    /// Snake-case identifier used in logs and graph output.
    pub fn name(self) -> &'static str {
        match self {
            Stage::UnitExtraction => "unit_extraction",
            Stage::RubricExtraction => "rubric_extraction",
            Stage::InitialEvaluation => "initial_evaluation",
            Stage::ReviewEvaluation => "review_evaluation",
            Stage::MarksExtraction => "marks_extraction",
            Stage::TotalMarks => "total_marks_calculation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Renders `unit` for error messages.
fn describe_unit(unit: &Option<String>) -> String {
    match unit {
        Some(unit) => format!(" for unit `{unit}`"),
        None => String::new(),
    }
}

/// Failures that abort a pipeline run.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// The oracle errored, timed out, or returned nothing usable.
    #[error("Stage `{stage}` failed{}: {source:#}", describe_unit(.unit))]
    Oracle {
        /// Stage that issued the call.
        stage:  Stage,
        /// Unit being processed, if the stage works per unit.
        unit:   Option<String>,
        /// Underlying failure.
        source: anyhow::Error,
    },
    /// A stage broke the write-once rules of the state.
    #[error("Stage `{stage}` produced inconsistent state: {source}")]
    State {
        /// Stage that attempted the write.
        stage:  Stage,
        /// Rule that was broken.
        source: StateError,
    },
}

impl PipelineError {
    /// Stage that failed.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Oracle { stage, .. } | PipelineError::State { stage, .. } => *stage,
        }
    }

    /// Unit being processed when the failure happened, if any.
    pub fn unit(&self) -> Option<&str> {
        match self {
            PipelineError::Oracle { unit, .. } => unit.as_deref(),
            PipelineError::State { source, .. } => match source {
                StateError::AlreadyWritten { unit, .. } | StateError::UnknownUnit { unit, .. } => {
                    Some(unit)
                }
                StateError::TotalAlreadySet => None,
            },
        }
    }
}

/// Makes one bounded oracle call on behalf of `stage`.
async fn ask<O: Oracle>(
    oracle: &O,
    options: &PipelineOptions,
    stage: Stage,
    unit: Option<&str>,
    prompt: &str,
) -> Result<String, PipelineError> {
    let fail = |source: anyhow::Error| PipelineError::Oracle {
        stage,
        unit: unit.map(str::to_owned),
        source,
    };

    debug!(%stage, unit = unit.unwrap_or("-"), "Calling oracle");
    let limit = options.request_timeout();
    match timeout(limit, oracle.complete(prompt)).await {
        Ok(Ok(response)) if response.trim().is_empty() => {
            Err(fail(anyhow::anyhow!("oracle returned an empty response")))
        }
        Ok(Ok(response)) => Ok(response),
        Ok(Err(err)) => Err(fail(err)),
        Err(_) => Err(fail(anyhow::anyhow!("oracle call timed out after {limit:?}"))),
    }
}

/// Runs one oracle call per `(unit, prompt)` job, at most
/// `options.concurrency()` at a time, and returns responses in job order.
async fn fan_out<O: Oracle>(
    oracle: &O,
    options: &PipelineOptions,
    stage: Stage,
    jobs: Vec<(String, String)>,
) -> Result<Vec<(String, String)>, PipelineError> {
    stream::iter(jobs)
        .map(|(unit, prompt)| async move {
            let response = ask(oracle, options, stage, Some(unit.as_str()), &prompt).await?;
            Ok::<_, PipelineError>((unit, response))
        })
        .buffered(options.concurrency())
        .try_collect()
        .await
}

/// Writes fan-out results into `slot`.
fn record_all(
    state: &mut EvaluationState,
    stage: Stage,
    slot: Slot,
    results: Vec<(String, String)>,
) -> Result<(), PipelineError> {
    for (unit, value) in results {
        state
            .record(slot, unit, value)
            .map_err(|source| PipelineError::State { stage, source })?;
    }
    Ok(())
}

/// Asks the oracle to list the submission's units and parses its answer.
///
/// An answer with no recognizable declaration leaves the unit map empty, which
/// turns every later per-unit stage into a no-op.
pub async fn extract_units<O: Oracle>(
    oracle: &O,
    options: &PipelineOptions,
    mut state: EvaluationState,
) -> Result<EvaluationState, PipelineError> {
    let stage = Stage::UnitExtraction;
    let prompt = prompts::unit_extraction(options, state.student_code());
    let response = ask(oracle, options, stage, None, &prompt).await?;

    match parsers::parse_units(&response, options.unit_keyword()) {
        ParseResult::Found(units) => {
            info!(count = units.len(), "Extracted units: {}", units.keys().join(", "));
            state.set_units(units);
        }
        ParseResult::NotFound => {
            warn!(
                "No `{}` declarations found in the extraction response; nothing will be graded",
                options.unit_keyword()
            );
        }
    }
    Ok(state)
}

/// Finds the rubric fragment for every extracted unit.
pub async fn extract_rubrics<O: Oracle>(
    oracle: &O,
    options: &PipelineOptions,
    mut state: EvaluationState,
) -> Result<EvaluationState, PipelineError> {
    let stage = Stage::RubricExtraction;
    let jobs = state
        .extracted_units()
        .keys()
        .map(|unit| {
            (unit.to_owned(), prompts::rubric_extraction(options, state.rubric(), unit))
        })
        .collect();

    let results = fan_out(oracle, options, stage, jobs).await?;
    record_all(&mut state, stage, Slot::Rubric, results)?;
    Ok(state)
}

/// Produces a first-pass evaluation for every extracted unit.
pub async fn evaluate_units<O: Oracle>(
    oracle: &O,
    options: &PipelineOptions,
    mut state: EvaluationState,
) -> Result<EvaluationState, PipelineError> {
    let stage = Stage::InitialEvaluation;
    let jobs = state
        .extracted_units()
        .iter()
        .map(|(unit, code)| {
            let rubric = state.extracted_rubrics().get(unit).unwrap_or_default();
            let prompt = prompts::initial_evaluation(
                state.problem_description(),
                code,
                state.model_solution(),
                rubric,
            );
            (unit.to_owned(), prompt)
        })
        .collect();

    let results = fan_out(oracle, options, stage, jobs).await?;
    record_all(&mut state, stage, Slot::InitialEvaluation, results)?;
    Ok(state)
}

/// Runs a second review pass over every initial evaluation.
pub async fn review_evaluations<O: Oracle>(
    oracle: &O,
    options: &PipelineOptions,
    mut state: EvaluationState,
) -> Result<EvaluationState, PipelineError> {
    let stage = Stage::ReviewEvaluation;
    let jobs = state
        .initial_evaluations()
        .iter()
        .map(|(unit, evaluation)| (unit.to_owned(), prompts::review_evaluation(evaluation)))
        .collect();

    let results = fan_out(oracle, options, stage, jobs).await?;
    record_all(&mut state, stage, Slot::FinalEvaluation, results)?;
    Ok(state)
}

/// Pulls the marks out of every final evaluation.
///
/// Marks are every digit sequence in the oracle's restatement (or in the
/// evaluation itself when restating is off). A unit with no digits at all
/// gets `"0"`.
pub async fn extract_marks<O: Oracle>(
    oracle: &O,
    options: &PipelineOptions,
    mut state: EvaluationState,
) -> Result<EvaluationState, PipelineError> {
    let stage = Stage::MarksExtraction;
    let sources: Vec<(String, String)> = if options.restate_marks() {
        let jobs = state
            .final_evaluations()
            .iter()
            .map(|(unit, evaluation)| (unit.to_owned(), prompts::marks_extraction(evaluation)))
            .collect();
        fan_out(oracle, options, stage, jobs).await?
    } else {
        state
            .final_evaluations()
            .iter()
            .map(|(unit, evaluation)| (unit.to_owned(), evaluation.to_owned()))
            .collect()
    };

    let marks = sources
        .into_iter()
        .map(|(unit, text)| {
            let marks = match parsers::extract_marks(&text) {
                ParseResult::Found(marks) => marks.join(","),
                ParseResult::NotFound => {
                    warn!("No marks found for unit `{unit}`; counting it as 0");
                    "0".to_string()
                }
            };
            (unit, marks)
        })
        .collect();

    record_all(&mut state, stage, Slot::Marks, marks)?;
    Ok(state)
}

/// Sums every unit's marks into the total.
pub fn total_marks(mut state: EvaluationState) -> Result<EvaluationState, PipelineError> {
    let total = aggregate::total_marks(state.extracted_marks());
    state
        .set_total_marks(total)
        .map_err(|source| PipelineError::State {
            stage: Stage::TotalMarks,
            source,
        })?;
    Ok(state)
}

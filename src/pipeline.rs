#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use itertools::Itertools;
use tracing::info;

use crate::{
    config::PipelineOptions,
    oracle::Oracle,
    stages::{self, PipelineError, Stage},
    state::EvaluationState,
};

/// Runs the grading stages in order against one oracle.
pub struct Pipeline<'o, O> {
    /// Completion service every oracle-backed stage calls.
    oracle:  &'o O,
    /// Pipeline knobs.
    options: PipelineOptions,
}

impl<'o, O: Oracle> Pipeline<'o, O> {
    /// Creates a pipeline over `oracle`.
    pub fn new(oracle: &'o O, options: PipelineOptions) -> Self {
        Self { oracle, options }
    }

    /// Returns the pipeline options.
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Runs a single stage on `state`.
    pub async fn run_stage(
        &self,
        stage: Stage,
        state: EvaluationState,
    ) -> Result<EvaluationState, PipelineError> {
        let (oracle, options) = (self.oracle, &self.options);
        match stage {
            Stage::UnitExtraction => stages::extract_units(oracle, options, state).await,
            Stage::RubricExtraction => stages::extract_rubrics(oracle, options, state).await,
            Stage::InitialEvaluation => stages::evaluate_units(oracle, options, state).await,
            Stage::ReviewEvaluation => stages::review_evaluations(oracle, options, state).await,
            Stage::MarksExtraction => stages::extract_marks(oracle, options, state).await,
            Stage::TotalMarks => stages::total_marks(state),
        }
    }

    /// Runs every stage, in order, starting from a freshly loaded state.
    pub async fn run(&self, mut state: EvaluationState) -> Result<EvaluationState, PipelineError> {
        for stage in Stage::ALL {
            info!("Running {stage}");
            state = self.run_stage(stage, state).await?;
        }
        info!(
            units = state.extracted_units().len(),
            total = state.total_marks(),
            "Pipeline finished"
        );
        Ok(state)
    }
}

/// Describes the stage graph as a Mermaid flowchart.
pub fn mermaid() -> String {
    let mut lines = vec!["graph TD;".to_string(), format!("\t__start__ --> {};", Stage::ALL[0])];
    lines.extend(
        Stage::ALL
            .iter()
            .tuple_windows()
            .map(|(from, to)| format!("\t{from} --> {to};")),
    );
    if let Some(last) = Stage::ALL.last() {
        lines.push(format!("\t{last} --> __end__;"));
    }
    lines.join("\n")
}

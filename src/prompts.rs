#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Prompt templates, embedded in the binary and filled per call.

use crate::config::PipelineOptions;

/// System message sent ahead of every prompt.
pub fn system_message() -> &'static str {
    include_str!("prompts/system_message.md")
}

/// Asks the oracle to list each top-level unit of `code`.
pub fn unit_extraction(options: &PipelineOptions, code: &str) -> String {
    format!(
        include_str!("prompts/unit_extraction.md"),
        language = options.language(),
        keyword = options.unit_keyword(),
        code = code,
    )
}

/// Asks for the part of `rubric` that applies to `unit`.
pub fn rubric_extraction(options: &PipelineOptions, rubric: &str, unit: &str) -> String {
    format!(
        include_str!("prompts/rubric_extraction.md"),
        rubric = rubric,
        language = options.language(),
        keyword = options.unit_keyword(),
        unit = unit,
    )
}

/// Asks for a first-pass evaluation of one unit.
pub fn initial_evaluation(
    problem: &str,
    code: &str,
    model_solution: &str,
    rubric: &str,
) -> String {
    format!(
        include_str!("prompts/initial_evaluation.md"),
        problem = problem,
        code = code,
        model_solution = model_solution,
        rubric = rubric,
    )
}

/// Asks the oracle to review an evaluation.
pub fn review_evaluation(evaluation: &str) -> String {
    format!(include_str!("prompts/review_evaluation.md"), evaluation = evaluation)
}

/// Asks the oracle to restate an evaluation's marks as a list.
pub fn marks_extraction(evaluation: &str) -> String {
    format!(include_str!("prompts/marks_extraction.md"), evaluation = evaluation)
}

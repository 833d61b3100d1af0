#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{fs, path::Path};

use anyhow::{Context, Result};
use itertools::Itertools;
use tabled::{
    Table, Tabled,
    settings::{Panel, Style},
};

use crate::{aggregate, parsers::parser, state::EvaluationState};

/// Renders the human-readable report.
///
/// One `Evaluation for <unit>:` section per unit, in extraction order, then a
/// `Total Marks:` line. Body lines that would read as a header or a total are
/// indented by one space so [`parse`] never mistakes them for structure.
pub fn render(state: &EvaluationState) -> String {
    let mut out = String::new();
    for (unit, evaluation) in state.final_evaluations().iter() {
        out.push_str(&format!("Evaluation for {unit}:\n"));
        out.push_str(&escape_body(evaluation));
        out.push_str("\n\n");
    }
    out.push_str(&format!("Total Marks: {:?}\n", state.total_marks()));
    out
}

/// Indents evaluation lines that match the header or total grammar.
fn escape_body(evaluation: &str) -> String {
    evaluation
        .lines()
        .map(|line| {
            if parser::report_header(line).is_ok() || parser::total_line(line).is_ok() {
                format!(" {line}")
            } else {
                line.to_owned()
            }
        })
        .join("\n")
}

/// Writes the report to `path`.
pub fn write(state: &EvaluationState, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Could not create {}", parent.display()))?;
    }
    fs::write(path, render(state)).with_context(|| format!("Could not write {}", path.display()))
}

/// Writes the full state as pretty JSON to `path`.
pub fn write_state_json(state: &EvaluationState, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(state).context("Could not serialize state")?;
    fs::write(path, json).with_context(|| format!("Could not write {}", path.display()))
}

/// What [`parse`] recovers from a report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedReport {
    /// Unit names from the section headers, in order.
    pub units: Vec<String>,
    /// Value of the `Total Marks:` line, if present.
    pub total: Option<f64>,
}

/// Recovers unit names and the total from rendered report text.
pub fn parse(report: &str) -> ParsedReport {
    let mut parsed = ParsedReport::default();
    for line in report.lines() {
        if let Ok(unit) = parser::report_header(line) {
            parsed.units.push(unit.to_owned());
        } else if let Ok(total) = parser::total_line(line) {
            parsed.total = Some(total);
        }
    }
    parsed
}

/// One row of the grading overview.
#[derive(Tabled)]
struct UnitRow {
    /// Unit name.
    #[tabled(rename = "Unit")]
    unit:     String,
    /// Comma-joined marks.
    #[tabled(rename = "Marks")]
    marks:    String,
    /// Sum of this unit's marks.
    #[tabled(rename = "Subtotal")]
    subtotal: String,
}

/// Renders a per-unit overview table.
pub fn summary_table(state: &EvaluationState) -> String {
    let rows: Vec<UnitRow> = state
        .extracted_marks()
        .iter()
        .map(|(unit, marks)| UnitRow {
            unit:     unit.to_owned(),
            marks:    marks.to_owned(),
            subtotal: format!("{:.2}", aggregate::sum_marks(marks)),
        })
        .collect();

    Table::new(&rows)
        .with(Style::modern())
        .with(Panel::header("Grading Overview"))
        .with(Panel::footer(format!("Total: {:.2}", state.total_marks())))
        .to_string()
}

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::fmt;

use serde::{Serialize, Serializer, ser::SerializeMap};

/// Errors raised when a stage tries to break the write-once rules of the
/// evaluation state.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The entry for this unit was already written by its owning stage.
    #[error("`{slot}` already holds an entry for unit `{unit}`")]
    AlreadyWritten {
        /// Map that rejected the write.
        slot: Slot,
        /// Unit whose entry was written twice.
        unit: String,
    },
    /// The unit was never produced by unit extraction.
    #[error("unit `{unit}` is not one of the extracted units (writing `{slot}`)")]
    UnknownUnit {
        /// Map that rejected the write.
        slot: Slot,
        /// Unit name that was not extracted.
        unit: String,
    },
    /// Total marks can only be set once.
    #[error("total marks have already been computed")]
    TotalAlreadySet,
}

/// An insertion-ordered map from unit name to text.
///
/// Keys keep the position of their first insertion; iteration always follows
/// that order so reports and summaries list units the way they appeared in the
/// submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitMap {
    /// Entries in insertion order.
    entries: Vec<(String, String)>,
}

impl UnitMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new entry. Fails if `unit` already has one.
    pub fn insert(
        &mut self,
        unit: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), String> {
        let unit = unit.into();
        if self.contains_key(&unit) {
            return Err(unit);
        }
        self.entries.push((unit, value.into()));
        Ok(())
    }

    /// Appends `block` to an existing entry on a new line, or inserts it if
    /// the unit is new.
    pub fn append(&mut self, unit: impl Into<String>, block: impl Into<String>) {
        let unit = unit.into();
        let block = block.into();
        match self.entries.iter_mut().find(|(k, _)| *k == unit) {
            Some((_, existing)) => {
                existing.push('\n');
                existing.push_str(&block);
            }
            None => self.entries.push((unit, block)),
        }
    }

    /// Returns the text stored for `unit`.
    pub fn get(&self, unit: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == unit)
            .map(|(_, v)| v.as_str())
    }

    /// Whether `unit` has an entry.
    pub fn contains_key(&self, unit: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == unit)
    }

    /// Unit names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Stored texts in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, v)| v.as_str())
    }

    /// `(unit, text)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Collects pairs into a map. A repeated key replaces the earlier value but
/// keeps the earlier position.
impl<K, V> FromIterator<(K, V)> for UnitMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = UnitMap::new();
        for (k, v) in iter {
            let (k, v) = (k.into(), v.into());
            match map.entries.iter_mut().find(|(existing, _)| *existing == k) {
                Some((_, slot)) => *slot = v,
                None => map.entries.push((k, v)),
            }
        }
        map
    }
}

impl Serialize for UnitMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Per-unit maps of [`EvaluationState`] that stages after extraction write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    /// `extracted_rubrics`
    Rubric,
    /// `initial_evaluations`
    InitialEvaluation,
    /// `final_evaluations`
    FinalEvaluation,
    /// `extracted_marks`
    Marks,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Slot::Rubric => "extracted_rubrics",
            Slot::InitialEvaluation => "initial_evaluations",
            Slot::FinalEvaluation => "final_evaluations",
            Slot::Marks => "extracted_marks",
        };
        f.write_str(name)
    }
}

/// The record threaded through every pipeline stage.
///
/// The four inputs are fixed at construction. Each stage then fills exactly
/// one map (or, for aggregation, the total) and hands the record on.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvaluationState {
    /// Problem statement given to students.
    problem_description: String,
    /// Reference solution.
    model_solution:      String,
    /// Full grading rubric.
    rubric:              String,
    /// The submission being graded.
    student_code:        String,
    /// Unit name -> unit source, in order of appearance.
    extracted_units:     UnitMap,
    /// Unit name -> rubric fragment.
    extracted_rubrics:   UnitMap,
    /// Unit name -> first-pass evaluation.
    initial_evaluations: UnitMap,
    /// Unit name -> reviewed evaluation.
    final_evaluations:   UnitMap,
    /// Unit name -> comma-joined marks.
    extracted_marks:     UnitMap,
    /// Sum of every extracted mark; `None` until aggregation runs.
    total_marks:         Option<f64>,
}

impl EvaluationState {
    /// Creates a state holding only the four inputs.
    pub fn new(
        problem_description: impl Into<String>,
        model_solution: impl Into<String>,
        rubric: impl Into<String>,
        student_code: impl Into<String>,
    ) -> Self {
        Self {
            problem_description: problem_description.into(),
            model_solution: model_solution.into(),
            rubric: rubric.into(),
            student_code: student_code.into(),
            ..Default::default()
        }
    }

    /// Returns the problem statement.
    pub fn problem_description(&self) -> &str {
        &self.problem_description
    }

    /// Returns the model solution.
    pub fn model_solution(&self) -> &str {
        &self.model_solution
    }

    /// Returns the full rubric.
    pub fn rubric(&self) -> &str {
        &self.rubric
    }

    /// Returns the submission text.
    pub fn student_code(&self) -> &str {
        &self.student_code
    }

    /// Returns the extracted units.
    pub fn extracted_units(&self) -> &UnitMap {
        &self.extracted_units
    }

    /// Returns the per-unit rubric fragments.
    pub fn extracted_rubrics(&self) -> &UnitMap {
        &self.extracted_rubrics
    }

    /// Returns the first-pass evaluations.
    pub fn initial_evaluations(&self) -> &UnitMap {
        &self.initial_evaluations
    }

    /// Returns the reviewed evaluations.
    pub fn final_evaluations(&self) -> &UnitMap {
        &self.final_evaluations
    }

    /// Returns the comma-joined marks per unit.
    pub fn extracted_marks(&self) -> &UnitMap {
        &self.extracted_marks
    }

    /// Returns the total, or 0 before aggregation has run.
    pub fn total_marks(&self) -> f64 {
        self.total_marks.unwrap_or_default()
    }

    /// Whether aggregation has run.
    pub fn is_aggregated(&self) -> bool {
        self.total_marks.is_some()
    }

    /// Installs the extraction result. Only the unit extractor calls this,
    /// and only once.
    pub(crate) fn set_units(&mut self, units: UnitMap) {
        self.extracted_units = units;
    }

    /// Returns the map backing `slot`.
    pub fn slot(&self, slot: Slot) -> &UnitMap {
        match slot {
            Slot::Rubric => &self.extracted_rubrics,
            Slot::InitialEvaluation => &self.initial_evaluations,
            Slot::FinalEvaluation => &self.final_evaluations,
            Slot::Marks => &self.extracted_marks,
        }
    }

    /// Writes one per-unit entry into `slot`.
    ///
    /// The unit must have been extracted and must not already have an entry
    /// in that slot.
    pub fn record(
        &mut self,
        slot: Slot,
        unit: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), StateError> {
        let unit = unit.into();
        if !self.extracted_units.contains_key(&unit) {
            return Err(StateError::UnknownUnit { slot, unit });
        }
        let map = match slot {
            Slot::Rubric => &mut self.extracted_rubrics,
            Slot::InitialEvaluation => &mut self.initial_evaluations,
            Slot::FinalEvaluation => &mut self.final_evaluations,
            Slot::Marks => &mut self.extracted_marks,
        };
        map.insert(unit, value)
            .map_err(|unit| StateError::AlreadyWritten { slot, unit })
    }

    /// Sets the total. Fails if it was already set.
    pub fn set_total_marks(&mut self, total: f64) -> Result<(), StateError> {
        if self.total_marks.is_some() {
            return Err(StateError::TotalAlreadySet);
        }
        self.total_marks = Some(total);
        Ok(())
    }
}

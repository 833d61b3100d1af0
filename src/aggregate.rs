#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use itertools::Itertools;
use tracing::warn;

use crate::state::UnitMap;

/// Sums a comma-separated list of marks.
///
/// Tokens are trimmed and empty tokens ignored. A token that is not a number
/// is skipped with a warning instead of failing the whole sum.
pub fn sum_marks(marks: &str) -> f64 {
    marks
        .split(',')
        .map(str::trim)
        .filter(|mark| !mark.is_empty())
        .filter_map(|mark| match mark.parse::<f64>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Invalid mark found: '{mark}'");
                None
            }
        })
        .sum()
}

/// Totals every unit's marks.
pub fn total_marks(extracted_marks: &UnitMap) -> f64 {
    sum_marks(&extracted_marks.values().join(","))
}

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::glob;
use tracing::warn;

use crate::{config::InputPaths, state::EvaluationState};

/// Strips trailing whitespace from every line and drops blank ones.
///
/// Leading whitespace is kept; indentation is significant in some of the
/// languages being graded.
pub fn normalize(text: &str) -> String {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reads a UTF-8 text file and normalizes it.
pub fn read_input(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    Ok(normalize(&text))
}

/// Reads a text file that may not be valid UTF-8, replacing bad bytes.
pub fn read_input_lossy(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("Could not read {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    if let std::borrow::Cow::Owned(_) = text {
        warn!("{} is not valid UTF-8; invalid bytes were replaced", path.display());
    }
    Ok(normalize(&text))
}

/// Loads the four inputs into a fresh state.
///
/// The submission is read lossily since student files are the ones most
/// likely to carry stray encodings.
pub fn load_state(paths: &InputPaths) -> Result<EvaluationState> {
    Ok(EvaluationState::new(
        read_input(paths.problem())?,
        read_input(paths.solution())?,
        read_input(paths.rubric())?,
        read_input_lossy(paths.submission())?,
    ))
}

/// Lists files matching `pattern`, sorted.
pub fn find_submissions(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = glob(pattern)
        .with_context(|| format!("Invalid submission pattern: {pattern}"))?
        .filter_map(Result::ok)
        .filter(|path| path.is_file())
        .collect();
    paths.sort();
    Ok(paths)
}

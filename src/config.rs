#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Result, bail};
use bon::Builder;
use itertools::Itertools;
use tracing::warn;

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Default per-request oracle timeout, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Default report file name.
pub const DEFAULT_REPORT_PATH: &str = "final_evaluations.txt";

/// Credentials and sampling settings for the completion service.
#[derive(Clone, Builder)]
#[builder(on(String, into))]
pub struct OracleEnv {
    /// Base URL for the OpenAI-compatible API endpoint.
    #[builder(default = DEFAULT_API_BASE.to_string())]
    api_base:    String,
    /// API key used to authenticate requests.
    api_key:     String,
    /// Model identifier for chat completions.
    model:       String,
    /// Sampling temperature; 0 keeps grading as repeatable as the service
    /// allows.
    #[builder(default = 0.0)]
    temperature: f32,
    /// Optional top-p override.
    top_p:       Option<f32>,
}

impl OracleEnv {
    /// Reads `OPENAI_ENDPOINT`, `OPENAI_API_KEY`, `OPENAI_MODEL`,
    /// `OPENAI_TEMPERATURE` and `OPENAI_TOP_P`.
    ///
    /// `model` and `temperature` override the environment when given.
    pub fn from_env(model: Option<String>, temperature: Option<f32>) -> Result<Self> {
        let api_base = env_trimmed("OPENAI_ENDPOINT").unwrap_or_else(|| DEFAULT_API_BASE.into());
        let Some(api_key) = env_trimmed("OPENAI_API_KEY") else {
            bail!("OPENAI_API_KEY must be set to grade submissions");
        };
        let Some(model) = model.or_else(|| env_trimmed("OPENAI_MODEL")) else {
            bail!("A model must be given with --model or OPENAI_MODEL");
        };

        let temperature = temperature
            .or_else(|| env_f32("OPENAI_TEMPERATURE"))
            .unwrap_or(0.0);
        let top_p = env_f32("OPENAI_TOP_P");

        Ok(Self {
            api_base,
            api_key,
            model,
            temperature,
            top_p,
        })
    }

    /// Returns the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Returns the API key.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Returns the model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the sampling temperature.
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Returns the configured top_p, if any.
    pub fn top_p(&self) -> Option<f32> {
        self.top_p
    }
}

impl std::fmt::Debug for OracleEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleEnv")
            .field("api_base", &self.api_base)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .finish()
    }
}

/// Knobs for the pipeline itself, independent of where inputs come from.
#[derive(Debug, Clone, Builder)]
#[builder(on(String, into))]
pub struct PipelineOptions {
    /// Language named in prompts.
    #[builder(default = "Java".to_string())]
    language:        String,
    /// Keyword that introduces a unit declaration, e.g. `class`.
    #[builder(default = "class".to_string())]
    unit_keyword:    String,
    /// Maximum number of oracle calls in flight within one stage.
    #[builder(default = 1)]
    concurrency:     usize,
    /// Ask the oracle to restate marks as a list before scanning for digits.
    /// When off, the final evaluation itself is scanned.
    #[builder(default = true)]
    restate_marks:   bool,
    /// Upper bound on a single oracle call.
    #[builder(default = Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))]
    request_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl PipelineOptions {
    /// Returns the language named in prompts.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Returns the unit declaration keyword.
    pub fn unit_keyword(&self) -> &str {
        &self.unit_keyword
    }

    /// Returns the per-stage concurrency limit, never less than 1.
    pub fn concurrency(&self) -> usize {
        self.concurrency.max(1)
    }

    /// Whether marks are restated by the oracle before scanning.
    pub fn restate_marks(&self) -> bool {
        self.restate_marks
    }

    /// Returns the per-call timeout.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

/// Locations of the four input artifacts.
#[derive(Debug, Clone, Builder)]
#[builder(on(PathBuf, into))]
pub struct InputPaths {
    /// Problem statement.
    problem:    PathBuf,
    /// Model solution source.
    solution:   PathBuf,
    /// Rubric text.
    rubric:     PathBuf,
    /// Student submission source.
    submission: PathBuf,
}

impl InputPaths {
    /// Returns the problem statement path.
    pub fn problem(&self) -> &Path {
        &self.problem
    }

    /// Returns the model solution path.
    pub fn solution(&self) -> &Path {
        &self.solution
    }

    /// Returns the rubric path.
    pub fn rubric(&self) -> &Path {
        &self.rubric
    }

    /// Returns the submission path.
    pub fn submission(&self) -> &Path {
        &self.submission
    }
}

/// Everything one grading run needs, passed explicitly instead of read from
/// globals.
#[derive(Debug, Clone, Builder)]
#[builder(on(PathBuf, into))]
pub struct GraderConfig {
    /// Input artifacts.
    inputs:     InputPaths,
    /// Where the text report goes.
    #[builder(default = PathBuf::from(DEFAULT_REPORT_PATH))]
    output:     PathBuf,
    /// Optional JSON dump of the final state.
    state_json: Option<PathBuf>,
    /// Pipeline knobs.
    #[builder(default)]
    pipeline:   PipelineOptions,
}

impl GraderConfig {
    /// Returns the input paths.
    pub fn inputs(&self) -> &InputPaths {
        &self.inputs
    }

    /// Returns the report path.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Returns the JSON state path, if any.
    pub fn state_json(&self) -> Option<&Path> {
        self.state_json.as_deref()
    }

    /// Returns the pipeline options.
    pub fn pipeline(&self) -> &PipelineOptions {
        &self.pipeline
    }

    /// Copies this configuration for another submission, sending its report
    /// to `<name>_report.txt` (and state dump, if enabled, to
    /// `<name>_state.json`) in `out_dir`.
    pub fn for_submission(&self, submission: &Path, name: &str, out_dir: &Path) -> Self {
        let mut inputs = self.inputs.clone();
        inputs.submission = submission.to_path_buf();

        Self {
            inputs,
            output: out_dir.join(format!("{name}_report.txt")),
            state_json: self
                .state_json
                .as_ref()
                .map(|_| out_dir.join(format!("{name}_state.json"))),
            pipeline: self.pipeline.clone(),
        }
    }
}

/// Picks a distinct report name for every submission in a batch.
///
/// A submission is named after its file stem when no other submission shares
/// it. Otherwise it is named after its folder, keeping the first two
/// `_`-separated parts (`alice_1_assignsubmission_file_` becomes `alice_1`).
/// Any name still taken gets a `_2`, `_3`, ... suffix.
pub fn report_names(submissions: &[PathBuf]) -> Vec<String> {
    let stems: Vec<String> = submissions
        .iter()
        .map(|path| lossy_name(path.file_stem()))
        .collect();
    let stem_counts = stems.iter().counts();

    let mut taken = HashSet::new();
    submissions
        .iter()
        .zip(&stems)
        .map(|(path, stem)| {
            let base = if stem_counts[stem] == 1 {
                stem.clone()
            } else {
                folder_label(path).unwrap_or_else(|| stem.clone())
            };
            let mut name = base.clone();
            let mut n = 2;
            while !taken.insert(name.clone()) {
                name = format!("{base}_{n}");
                n += 1;
            }
            name
        })
        .collect()
}

/// First two `_`-separated parts of the submission's folder name.
fn folder_label(path: &Path) -> Option<String> {
    let folder = path.parent()?.file_name()?.to_string_lossy();
    let label = folder.split('_').take(2).filter(|part| !part.is_empty()).join("_");
    if label.is_empty() { None } else { Some(label) }
}

/// Converts a path component to an owned string, falling back to
/// `submission`.
fn lossy_name(part: Option<&std::ffi::OsStr>) -> String {
    part.map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "submission".to_string())
}

/// Reads an environment variable, trimming it and treating blank values as
/// unset.
fn env_trimmed(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Reads a float setting, warning and ignoring it when it does not parse.
fn env_f32(key: &str) -> Option<f32> {
    let raw = env_trimmed(key)?;
    parse_f32_setting(key, &raw)
}

/// Parses `raw` as the value of setting `key`, warning when it is malformed.
pub fn parse_f32_setting(key: &str, raw: &str) -> Option<f32> {
    match raw.trim().parse::<f32>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => {
            warn!("Ignoring invalid {key} value: '{raw}'");
            None
        }
    }
}

/// Parses an environment variable into a `Duration`, falling back to
/// `default_secs` when parsing fails or the variable is missing.
pub fn read_timeout_secs(env: &str, default_secs: u64) -> Duration {
    std::env::var(env)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}

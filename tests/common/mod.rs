#![allow(dead_code)]

use std::{
    future::Future,
    path::PathBuf,
    sync::Mutex,
    time::Duration,
};

use anyhow::Result;
use rubric_grade::oracle::Oracle;
use uuid::Uuid;

/// Oracle answering with a closure and recording every prompt it saw.
pub struct ScriptedOracle<F> {
    respond: F,
    prompts: Mutex<Vec<String>>,
}

impl<F> ScriptedOracle<F>
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    pub fn new(respond: F) -> Self {
        Self {
            respond,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls_containing(&self, needle: &str) -> usize {
        self.prompts().iter().filter(|p| p.contains(needle)).count()
    }
}

impl<F> Oracle for ScriptedOracle<F>
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    fn complete(&self, prompt: &str) -> impl Future<Output = Result<String>> + Send {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let answer = (self.respond)(prompt);
        async move { answer }
    }
}

/// Oracle that never answers within any reasonable timeout.
pub struct StalledOracle;

impl Oracle for StalledOracle {
    fn complete(&self, _prompt: &str) -> impl Future<Output = Result<String>> + Send {
        async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("too late".to_string())
        }
    }
}

/// Phrases that identify which stage a prompt belongs to.
pub const UNIT_PROMPT: &str = "Extract each top-level";
pub const RUBRIC_PROMPT: &str = "Given the following rubric";
pub const EVALUATE_PROMPT: &str = "Evaluate the following student code";
pub const REVIEW_PROMPT: &str = "Review and correct if necessary";
pub const MARKS_PROMPT: &str = "extract a comma-separated list of marks";

/// Extraction response describing a `Calculator` and a `Helper` class.
pub const TWO_CLASSES: &str = "Here are the classes:\n\
public class Calculator {\n\
int add(int a, int b) { return a + b; }\n\
}\n\
class Helper's code follows.\n\
final class Helper{\n\
void help() {}\n\
}";

/// Canned answers for a two-unit run where Calculator scores 10,5 and Helper 3.
pub fn two_unit_answers(prompt: &str) -> Result<String> {
    let answer = if prompt.contains(UNIT_PROMPT) {
        TWO_CLASSES.to_string()
    } else if prompt.contains(RUBRIC_PROMPT) {
        if prompt.contains("named Calculator") {
            "Calculator rubric".to_string()
        } else {
            "Helper rubric".to_string()
        }
    } else if prompt.contains(EVALUATE_PROMPT) {
        if prompt.contains("Calculator rubric") {
            "initial: Calculator".to_string()
        } else {
            "initial: Helper".to_string()
        }
    } else if prompt.contains(REVIEW_PROMPT) {
        if prompt.contains("initial: Calculator") {
            "final: Calculator is correct".to_string()
        } else {
            "final: Helper is mostly correct".to_string()
        }
    } else if prompt.contains(MARKS_PROMPT) {
        if prompt.contains("final: Calculator") {
            "10, 5".to_string()
        } else {
            "3".to_string()
        }
    } else {
        anyhow::bail!("unexpected prompt: {prompt}")
    };
    Ok(answer)
}

/// Fresh scratch directory under the system temp dir.
pub fn temp_dir(tag: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!("rubric-grade-{tag}-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&root).expect("create temp dir");
    root
}

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # rubric-grade
//!
//! Command line entry point. Credentials come from the environment (a `.env`
//! file is honoured); input paths and pipeline knobs come from flags.

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use bpaf::*;
use colored::Colorize;
use dotenvy::dotenv;
use rubric_grade::{
    batch_table,
    config::{
        DEFAULT_REPORT_PATH, DEFAULT_REQUEST_TIMEOUT_SECS, GraderConfig, InputPaths, OracleEnv,
        PipelineOptions, read_timeout_secs,
    },
    grade, grade_batch,
    oracle::OpenAiOracle,
    pipeline, report,
};
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Inputs and knobs shared by `grade` and `batch`.
#[derive(Debug, Clone)]
struct Common {
    /// Problem statement path.
    problem:         PathBuf,
    /// Model solution path.
    solution:        PathBuf,
    /// Rubric path.
    rubric:          PathBuf,
    /// Model override.
    model:           Option<String>,
    /// Temperature override.
    temperature:     Option<f32>,
    /// Language named in prompts.
    language:        String,
    /// Unit declaration keyword.
    keyword:         String,
    /// Concurrent oracle calls per stage.
    jobs:            usize,
    /// Scan final evaluations directly instead of asking for a marks list.
    scan_evaluation: bool,
    /// Where to dump the final state as JSON.
    state_json:      Option<PathBuf>,
}

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Grade one submission
    Grade(Common, PathBuf, PathBuf),
    /// Grade every submission matching a glob
    Batch(Common, String, PathBuf),
    /// Print the stage graph
    Graph,
}

/// Parsed command line.
#[derive(Debug, Clone)]
struct Opts {
    /// Log at debug level.
    verbose: bool,
    /// Command to run.
    cmd:     Cmd,
}

/// Parse the command line arguments and return `Opts`
fn options() -> Opts {
    /// parses a required path flag
    fn path(name: &'static str, help: &'static str) -> impl Parser<PathBuf> {
        long(name).help(help).argument::<PathBuf>("PATH")
    }

    /// parses the flags shared by grading commands
    fn common() -> impl Parser<Common> {
        let problem = path("problem", "Problem description file");
        let solution = path("solution", "Model solution file");
        let rubric = path("rubric", "Rubric file");
        let model = long("model")
            .help("Model identifier (defaults to OPENAI_MODEL)")
            .argument::<String>("MODEL")
            .optional();
        let temperature = long("temperature")
            .help("Sampling temperature (defaults to OPENAI_TEMPERATURE or 0)")
            .argument::<f32>("T")
            .optional();
        let language = long("language")
            .help("Language named in prompts")
            .argument::<String>("LANG")
            .fallback("Java".to_string());
        let keyword = long("keyword")
            .help("Keyword that introduces a unit declaration")
            .argument::<String>("WORD")
            .fallback("class".to_string());
        let jobs = short('j')
            .long("jobs")
            .help("Oracle calls allowed in flight per stage")
            .argument::<usize>("N")
            .fallback(1);
        let scan_evaluation = long("scan-evaluation")
            .help("Take marks straight from the final evaluation instead of asking for a list")
            .switch();
        let state_json = long("state-json")
            .help("Also write the final state as JSON to PATH (batch runs name one per submission)")
            .argument::<PathBuf>("PATH")
            .optional();
        construct!(Common {
            problem,
            solution,
            rubric,
            model,
            temperature,
            language,
            keyword,
            jobs,
            scan_evaluation,
            state_json,
        })
    }

    let grade = {
        let submission = path("submission", "Student submission file");
        let output = long("output")
            .help("Report path")
            .argument::<PathBuf>("PATH")
            .fallback(PathBuf::from(DEFAULT_REPORT_PATH));
        construct!(Cmd::Grade(common(), submission, output))
            .to_options()
            .command("grade")
            .help("Grade one submission")
    };

    let batch = {
        let pattern = long("pattern")
            .help("Glob matching submission files")
            .argument::<String>("GLOB");
        let out_dir = long("out-dir")
            .help("Directory for reports")
            .argument::<PathBuf>("DIR")
            .fallback(PathBuf::from("evaluation_reports"));
        construct!(Cmd::Batch(common(), pattern, out_dir))
            .to_options()
            .command("batch")
            .help("Grade every submission matching a glob")
    };

    let graph = pure(Cmd::Graph)
        .to_options()
        .command("graph")
        .help("Print the stage graph as Mermaid");

    let verbose = short('v')
        .long("verbose")
        .help("Log at debug level")
        .switch();
    let cmd = construct!([grade, batch, graph]);

    construct!(Opts { verbose, cmd })
        .to_options()
        .descr("Rubric-driven grading of code submissions")
        .run()
}

/// Builds the run configuration and oracle from parsed flags.
fn setup(
    common: Common,
    submission: PathBuf,
    output: PathBuf,
) -> Result<(GraderConfig, OpenAiOracle)> {
    let oracle = OpenAiOracle::new(OracleEnv::from_env(common.model, common.temperature)?);
    let timeout: Duration =
        read_timeout_secs("GRADER_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS);

    let pipeline = PipelineOptions::builder()
        .language(common.language)
        .unit_keyword(common.keyword)
        .concurrency(common.jobs)
        .restate_marks(!common.scan_evaluation)
        .request_timeout(timeout)
        .build();
    let inputs = InputPaths::builder()
        .problem(common.problem)
        .solution(common.solution)
        .rubric(common.rubric)
        .submission(submission)
        .build();
    let config = GraderConfig::builder()
        .inputs(inputs)
        .output(output)
        .maybe_state_json(common.state_json)
        .pipeline(pipeline)
        .build();
    Ok((config, oracle))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let opts = options();

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false);
    let filter_layer =
        LevelFilter::from_level(if opts.verbose { Level::DEBUG } else { Level::INFO });
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    match opts.cmd {
        Cmd::Grade(common, submission, output) => {
            let (config, oracle) = setup(common, submission, output)?;
            let state = grade(&oracle, &config).await?;
            eprintln!("{}", report::summary_table(&state));
            println!(
                "{} Results saved in '{}'",
                "Evaluation complete.".green().bold(),
                config.output().display()
            );
        }
        Cmd::Batch(common, pattern, out_dir) => {
            // The submission and output here are placeholders; each match
            // gets its own via `GraderConfig::for_submission`.
            let (config, oracle) =
                setup(common, PathBuf::new(), out_dir.join(DEFAULT_REPORT_PATH))?;
            let entries = grade_batch(&oracle, &config, &pattern, &out_dir).await?;
            eprintln!("{}", batch_table(&entries));
        }
        Cmd::Graph => println!("{}", pipeline::mermaid()),
    }

    Ok(())
}

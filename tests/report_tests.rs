mod common;

use std::fs;

use common::*;
use rubric_grade::{
    config::{GraderConfig, InputPaths, PipelineOptions},
    grade, grade_batch,
    pipeline::Pipeline,
    report,
    state::EvaluationState,
};

async fn graded_state() -> EvaluationState {
    let oracle = ScriptedOracle::new(two_unit_answers);
    Pipeline::new(&oracle, PipelineOptions::default())
        .run(EvaluationState::new("problem", "solution", "rubric", "code"))
        .await
        .expect("pipeline run")
}

fn write_inputs(dir: &std::path::Path) -> InputPaths {
    fs::write(dir.join("problem.txt"), "Write a calculator.\n\n").unwrap();
    fs::write(dir.join("solution.java"), "public class Calculator {}\n").unwrap();
    fs::write(dir.join("rubric.txt"), "  10 marks for add  \n\n 5 for style\n").unwrap();
    fs::write(
        dir.join("student.java"),
        "public class Calculator {\n    int add(int a, int b) {\n        return a + b;   \n    }\n\n}\n",
    )
    .unwrap();

    InputPaths::builder()
        .problem(dir.join("problem.txt"))
        .solution(dir.join("solution.java"))
        .rubric(dir.join("rubric.txt"))
        .submission(dir.join("student.java"))
        .build()
}

#[tokio::test]
async fn report_lists_units_then_total() {
    let state = graded_state().await;
    let text = report::render(&state);

    assert_eq!(
        text,
        "Evaluation for Calculator:\nfinal: Calculator is correct\n\n\
         Evaluation for Helper:\nfinal: Helper is mostly correct\n\n\
         Total Marks: 18.0\n"
    );
}

#[tokio::test]
async fn report_round_trips_units_and_total() {
    let state = graded_state().await;
    let parsed = report::parse(&report::render(&state));

    let units: Vec<String> = state.extracted_units().keys().map(str::to_owned).collect();
    assert_eq!(parsed.units, units);
    assert_eq!(parsed.total, Some(state.total_marks()));
}

#[test]
fn empty_state_report_has_only_total() {
    let mut state = EvaluationState::new("p", "s", "r", "c");
    state.set_total_marks(0.0).unwrap();
    let text = report::render(&state);

    assert_eq!(text, "Total Marks: 0.0\n");
    let parsed = report::parse(&text);
    assert!(parsed.units.is_empty());
    assert_eq!(parsed.total, Some(0.0));
}

#[tokio::test]
async fn summary_table_shows_every_unit() {
    let table = report::summary_table(&graded_state().await);
    assert!(table.contains("Calculator"));
    assert!(table.contains("15.00"));
    assert!(table.contains("Helper"));
    assert!(table.contains("Total: 18.00"));
}

#[tokio::test]
async fn grade_writes_report_and_state_json() {
    let dir = temp_dir("grade");
    let config = GraderConfig::builder()
        .inputs(write_inputs(&dir))
        .output(dir.join("out").join("report.txt"))
        .state_json(dir.join("out").join("state.json"))
        .build();
    let oracle = ScriptedOracle::new(two_unit_answers);

    let state = grade(&oracle, &config).await.expect("grade");

    assert_eq!(state.rubric(), "  10 marks for add\n 5 for style");
    assert_eq!(
        state.student_code(),
        "public class Calculator {\n    int add(int a, int b) {\n        return a + b;\n    }\n}"
    );
    assert_eq!(state.problem_description(), "Write a calculator.");

    let text = fs::read_to_string(config.output()).expect("report written");
    assert_eq!(report::parse(&text).total, Some(18.0));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.join("out/state.json")).unwrap()).unwrap();
    assert_eq!(json["extracted_marks"]["Calculator"], "10,5");
    assert_eq!(json["total_marks"], 18.0);

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn failed_run_writes_no_report() {
    let dir = temp_dir("failed");
    let config = GraderConfig::builder()
        .inputs(write_inputs(&dir))
        .output(dir.join("report.txt"))
        .build();
    let oracle = ScriptedOracle::new(|prompt: &str| {
        if prompt.contains(EVALUATE_PROMPT) {
            anyhow::bail!("service unavailable")
        }
        two_unit_answers(prompt)
    });

    let err = grade(&oracle, &config).await.expect_err("evaluation fails");
    assert!(format!("{err:#}").contains("initial_evaluation"));
    assert!(!config.output().exists());

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn missing_input_is_reported_with_path() {
    let dir = temp_dir("missing");
    let config = GraderConfig::builder()
        .inputs(
            InputPaths::builder()
                .problem(dir.join("nope.txt"))
                .solution(dir.join("nope.java"))
                .rubric(dir.join("nope.md"))
                .submission(dir.join("nope.py"))
                .build(),
        )
        .output(dir.join("report.txt"))
        .build();
    let oracle = ScriptedOracle::new(two_unit_answers);

    let err = grade(&oracle, &config).await.expect_err("inputs missing");
    assert!(err.to_string().contains("nope.txt"));
    assert!(oracle.prompts().is_empty());

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn batch_writes_one_report_per_submission() {
    let dir = temp_dir("batch");
    let inputs = write_inputs(&dir);
    let subs = dir.join("subs");
    fs::create_dir_all(&subs).unwrap();
    fs::write(subs.join("alice.java"), "public class Calculator {}").unwrap();
    fs::write(subs.join("bob.java"), [0x70, 0xff, 0x71]).unwrap();

    let config = GraderConfig::builder()
        .inputs(inputs)
        .output(dir.join("unused.txt"))
        .build();
    let out_dir = dir.join("reports");
    let pattern = format!("{}/*.java", subs.display());
    let oracle = ScriptedOracle::new(two_unit_answers);

    let entries = grade_batch(&oracle, &config, &pattern, &out_dir)
        .await
        .expect("batch");

    assert_eq!(entries.len(), 2);
    for entry in &entries {
        assert_eq!(*entry.outcome.as_ref().expect("graded"), 18.0);
        assert!(entry.report.exists());
    }
    assert!(out_dir.join("alice_report.txt").exists());
    assert!(out_dir.join("bob_report.txt").exists());
    assert!(rubric_grade::batch_table(&entries).contains("Graded 2/2"));

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn batch_with_no_matches_fails() {
    let dir = temp_dir("empty-batch");
    let config = GraderConfig::builder()
        .inputs(write_inputs(&dir))
        .build();
    let oracle = ScriptedOracle::new(two_unit_answers);
    let pattern = format!("{}/*.nothing", dir.display());

    assert!(grade_batch(&oracle, &config, &pattern, &dir.join("out")).await.is_err());

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn batch_names_reports_after_student_folders() {
    let dir = temp_dir("batch-folders");
    let inputs = write_inputs(&dir);
    for student in ["alice_1_assignsubmission_file_", "bob_2_assignsubmission_file_"] {
        let folder = dir.join("subs").join(student);
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("Main.java"), "public class Calculator {}").unwrap();
    }

    let config = GraderConfig::builder().inputs(inputs).build();
    let out_dir = dir.join("reports");
    let pattern = format!("{}/*/*.java", dir.join("subs").display());
    let oracle = ScriptedOracle::new(two_unit_answers);

    let entries = grade_batch(&oracle, &config, &pattern, &out_dir)
        .await
        .expect("batch");

    assert_eq!(entries.len(), 2);
    assert_ne!(entries[0].report, entries[1].report);
    assert!(out_dir.join("alice_1_report.txt").exists());
    assert!(out_dir.join("bob_2_report.txt").exists());
    assert_eq!(fs::read_dir(&out_dir).unwrap().count(), 2);

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn header_shaped_evaluation_lines_do_not_add_units() {
    let oracle = ScriptedOracle::new(|prompt: &str| {
        if prompt.contains(REVIEW_PROMPT) && prompt.contains("initial: Calculator") {
            return Ok("final: Calculator\nEvaluation for Helper:\nTotal Marks: 99".to_string());
        }
        two_unit_answers(prompt)
    });
    let state = Pipeline::new(&oracle, PipelineOptions::default())
        .run(EvaluationState::new("problem", "solution", "rubric", "code"))
        .await
        .expect("pipeline run");

    let text = report::render(&state);
    assert!(text.contains("\n Evaluation for Helper:\n Total Marks: 99\n"));

    let parsed = report::parse(&text);
    assert_eq!(parsed.units, vec!["Calculator", "Helper"]);
    assert_eq!(parsed.total, Some(18.0));
}

#[tokio::test]
async fn state_dump_may_not_overwrite_the_report() {
    let dir = temp_dir("same-path");
    let config = GraderConfig::builder()
        .inputs(write_inputs(&dir))
        .output(dir.join("report.json"))
        .state_json(dir.join("report.json"))
        .build();
    let oracle = ScriptedOracle::new(two_unit_answers);

    let err = grade(&oracle, &config).await.expect_err("paths collide");
    assert!(err.to_string().contains("overwrite"), "{err}");
    assert!(oracle.prompts().is_empty());
    assert!(!config.output().exists());

    let _ = fs::remove_dir_all(dir);
}

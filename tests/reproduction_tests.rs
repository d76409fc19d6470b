//! Reproduction stage: deadline enforcement and exit code policy

use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use reprodesk::exec::{FakeBehavior, FakeProcessRunner};
use reprodesk::llm::ScriptedModel;
use reprodesk::pipeline::{ReproductionSettings, ReproductionStage, TIMEOUT_NOTE};
use reprodesk_core::{AnalysisResult, Issue, NewIssue, OriginRef, TestPlan};

fn issue() -> Issue {
    Issue::from_new(
        7,
        NewIssue::new("u1", "alice", "Export never finishes", OriginRef::default()),
        chrono::Utc::now(),
    )
}

fn stage(runner: Arc<FakeProcessRunner>, timeout: Duration) -> ReproductionStage {
    ReproductionStage::new(
        Arc::new(ScriptedModel::canned()),
        runner,
        ReproductionSettings {
            timeout,
            ..ReproductionSettings::default()
        },
    )
}

#[tokio::test]
async fn test_hanging_test_is_killed_at_deadline() {
    let work = TempDir::new().unwrap();
    let runner = Arc::new(
        FakeProcessRunner::new().program("ts-node", FakeBehavior::hang().stdout("starting\n")),
    );
    let deadline = Duration::from_millis(200);
    let stage = stage(runner.clone(), deadline);

    let started = Instant::now();
    let reproduction = stage
        .reproduce(&issue(), &AnalysisResult::fallback(), &TestPlan::default(), work.path())
        .await
        .unwrap();
    let elapsed = started.elapsed();

    let outcome = reproduction.outcome;
    assert!(elapsed < deadline + Duration::from_secs(2), "took {elapsed:?}");
    assert!(!outcome.success);
    assert!(!outcome.reproduced);
    assert!(outcome.timed_out);
    assert!(outcome.stderr.contains("timed out"));
    assert!(outcome.stderr.ends_with(TIMEOUT_NOTE));
    assert_eq!(outcome.stdout, "starting\n");
    assert_eq!(outcome.exit_code, None);
    assert_eq!(runner.kills(), 1);
}

#[tokio::test]
async fn test_exit_codes_map_to_reproduced_flag() {
    for (code, expected) in [(0, true), (1, false), (137, false)] {
        let work = TempDir::new().unwrap();
        let runner = Arc::new(FakeProcessRunner::new().program("ts-node", FakeBehavior::exit(code)));
        let stage = stage(runner, Duration::from_secs(5));

        let outcome = stage
            .reproduce(&issue(), &AnalysisResult::fallback(), &TestPlan::default(), work.path())
            .await
            .unwrap()
            .outcome;

        assert_eq!(outcome.reproduced, expected, "exit code {code}");
        assert!(outcome.success, "exit code {code}");
        assert_eq!(outcome.exit_code, Some(code));
    }
}

#[tokio::test]
async fn test_missing_interpreter_is_not_a_stage_failure() {
    let work = TempDir::new().unwrap();
    let stage = stage(Arc::new(FakeProcessRunner::new()), Duration::from_secs(5));

    let outcome = stage
        .reproduce(&issue(), &AnalysisResult::fallback(), &TestPlan::default(), work.path())
        .await
        .unwrap()
        .outcome;

    assert!(!outcome.success);
    assert!(!outcome.reproduced);
    assert!(outcome.stderr.contains("failed to spawn ts-node"));
}

#[tokio::test]
async fn test_runs_main_file_inside_tests_dir() {
    let work = TempDir::new().unwrap();
    let runner = Arc::new(FakeProcessRunner::new().program("ts-node", FakeBehavior::exit(1)));
    let stage = stage(runner.clone(), Duration::from_secs(5));

    let reproduction = stage
        .reproduce(&issue(), &AnalysisResult::fallback(), &TestPlan::default(), work.path())
        .await
        .unwrap();

    let spawned = runner.spawned();
    assert_eq!(spawned.len(), 1);
    assert_eq!(spawned[0].args, vec!["issue-test.ts"]);
    assert_eq!(spawned[0].cwd.as_deref(), Some(work.path().join("tests").as_path()));
    assert_eq!(spawned[0].env.get("NODE_ENV").map(String::as_str), Some("test"));

    let artifacts = reproduction.artifacts;
    assert_eq!(artifacts.files.len(), 4);
    for file in &artifacts.files {
        assert!(file.exists(), "{} missing", file.display());
    }
    let setup = std::fs::read_to_string(artifacts.test_dir.join("setup.ts")).unwrap();
    assert!(setup.contains("setupTest"));
}

//! Example replay through the event bus

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use reprodesk::blob::MemoryBlobStore;
use reprodesk::exec::{FakeBehavior, FakeProcessRunner};
use reprodesk::harness::{EventBus, ExampleResult, SimEventKind, Simulator};
use reprodesk::intake::Intake;
use reprodesk::llm::ScriptedModel;
use reprodesk::pipeline::{Investigator, InvestigatorSettings, ReproductionSettings};
use reprodesk_core::{IssueStatus, Store};
use reprodesk_databases::MemoryStore;

fn simulator(work: &Path, examples: &Path, store: Arc<MemoryStore>) -> Simulator {
    let investigator = Investigator::new(
        store,
        Arc::new(ScriptedModel::canned()),
        Arc::new(FakeProcessRunner::new().program("ts-node", FakeBehavior::exit(1))),
        Arc::new(MemoryBlobStore::new()),
        InvestigatorSettings {
            work_root: work.to_path_buf(),
            maintainer_id: None,
            reproduction: ReproductionSettings::default(),
        },
    );
    Simulator::new(
        Arc::new(Intake::new(Arc::new(investigator))),
        Arc::new(EventBus::new()),
        examples,
    )
}

fn write_examples(dir: &Path) {
    std::fs::write(
        dir.join("01-login.json"),
        r#"{"description": "Login button does nothing on Firefox", "userId": "u1", "username": "alice"}"#,
    )
    .unwrap();
    std::fs::write(
        dir.join("02-export.md"),
        "Exporting a report larger than 10MB hangs forever.\n",
    )
    .unwrap();
    std::fs::write(dir.join("03-broken.json"), "{\"descr").unwrap();
    std::fs::write(
        dir.join("04-crash.json"),
        r#"{"description": "The CLI panics when the config file is empty"}"#,
    )
    .unwrap();
    std::fs::write(dir.join("notes.txt"), "ignored").unwrap();
}

#[tokio::test]
async fn test_batch_survives_one_bad_example() {
    reprodesk::logging::init_test_logging();
    let work = TempDir::new().unwrap();
    let examples = TempDir::new().unwrap();
    write_examples(examples.path());
    let store = Arc::new(MemoryStore::new());
    let sim = simulator(work.path(), examples.path(), store.clone());

    let report = sim.run_all().await.unwrap();

    assert_eq!(report.total(), 4);
    assert_eq!(report.successes(), 3);
    assert_eq!(report.failures(), 1);
    let failed: Vec<_> = report
        .results
        .iter()
        .filter(|r| !r.is_success())
        .map(|r| r.example().to_string())
        .collect();
    assert_eq!(failed, vec!["03-broken.json"]);

    // Later examples still ran
    assert_eq!(report.results[3].example(), "04-crash.json");
    assert!(report.results[3].is_success());
    assert_eq!(store.issue_count().await, 3);

    let markdown = report.render_markdown();
    assert!(markdown.contains("- Successful: 3"));
    assert!(markdown.contains("- Failed: 1"));
    assert!(markdown.contains("\"problemCategory\": \"bug\""));
}

#[tokio::test]
async fn test_single_run_records_event_trace() {
    let work = TempDir::new().unwrap();
    let examples = TempDir::new().unwrap();
    write_examples(examples.path());
    let store = Arc::new(MemoryStore::new());
    let sim = simulator(work.path(), examples.path(), store.clone());

    let run = sim
        .simulate(&examples.path().join("01-login.json"))
        .await
        .unwrap();

    assert_eq!(run.final_status, IssueStatus::Resolved);
    assert_eq!(run.reproduced, Some(false));
    assert!(run.analysis.is_some());

    let first = &run.events[0];
    assert_eq!(first.kind, SimEventKind::Reply);
    assert!(first.content.contains("alice"));
    assert!(run.events[1..]
        .iter()
        .all(|e| e.kind == SimEventKind::Edit && e.handle == first.handle));
    assert!(run
        .events
        .last()
        .unwrap()
        .content
        .contains("wasn't able to reproduce"));
    assert_eq!(sim.bus().events_for(&run.conversation), run.events);

    let issue = store.get_issue(run.issue_id).await.unwrap().unwrap();
    assert_eq!(issue.user_id, "u1");
    assert_eq!(issue.report, "Login button does nothing on Firefox");
}

#[tokio::test]
async fn test_missing_examples_dir_is_an_error() {
    let work = TempDir::new().unwrap();
    let sim = simulator(
        work.path(),
        &work.path().join("nope"),
        Arc::new(MemoryStore::new()),
    );
    assert!(sim.run_all().await.is_err());
}

#[tokio::test]
async fn test_failed_example_keeps_error_text() {
    let work = TempDir::new().unwrap();
    let examples = TempDir::new().unwrap();
    std::fs::write(examples.path().join("empty.md"), "\n").unwrap();
    let sim = simulator(work.path(), examples.path(), Arc::new(MemoryStore::new()));

    let report = sim.run_all().await.unwrap();
    match &report.results[0] {
        ExampleResult::Failed { error, .. } => assert!(error.contains("empty description")),
        other => panic!("expected failure, got {other:?}"),
    }
}

//! Intake desk: acknowledgement, session expiry and cancellation

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Notify;

use reprodesk::blob::MemoryBlobStore;
use reprodesk::exec::{FakeBehavior, FakeProcessRunner};
use reprodesk::intake::{InboundReport, Intake, IntakeError, SessionTracker};
use reprodesk::llm::ScriptedModel;
use reprodesk::pipeline::{Investigator, InvestigatorSettings, ReproductionSettings};
use reprodesk::reporter::{MessageHandle, RecordingReporter, Reporter, ReporterError};
use reprodesk_core::{IssueStatus, OriginRef, Store};
use reprodesk_databases::MemoryStore;

fn intake(work: &TempDir, store: Arc<MemoryStore>, ttl: Duration) -> Intake {
    let investigator = Investigator::new(
        store,
        Arc::new(ScriptedModel::canned()),
        Arc::new(FakeProcessRunner::new().program("ts-node", FakeBehavior::exit(1))),
        Arc::new(MemoryBlobStore::new()),
        InvestigatorSettings {
            work_root: work.path().to_path_buf(),
            maintainer_id: None,
            reproduction: ReproductionSettings::default(),
        },
    );
    Intake::with_tracker(Arc::new(investigator), SessionTracker::new(ttl))
}

fn report(user: &str) -> InboundReport {
    InboundReport {
        user_id: user.into(),
        username: user.into(),
        content: "Uploads fail with a 413".into(),
        origin: OriginRef {
            message_id: "origin-1".into(),
            channel_id: "help".into(),
            timestamp_ms: 1_700_000_000_000,
        },
    }
}

#[tokio::test]
async fn test_begin_creates_pending_issue_and_investigates() {
    let work = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let intake = intake(&work, store.clone(), Duration::minutes(30));
    let reporter = RecordingReporter::new();

    let outward = intake.receive(report("u1"), &reporter).await.unwrap().unwrap();
    assert_eq!(intake.open_sessions().await, 1);
    let outcome = intake.begin(&outward, &reporter).await.unwrap();

    assert_eq!(outcome.final_status, IssueStatus::Resolved);
    assert_eq!(intake.open_sessions().await, 0);
    let issue = store.get_issue(outcome.issue_id).await.unwrap().unwrap();
    assert_eq!(issue.origin.channel_id, "help");
    let updates = store.list_investigation_updates(issue.id).await.unwrap();
    assert_eq!(updates[0].status, IssueStatus::InProgress);
}

#[tokio::test]
async fn test_busy_user_is_ignored() {
    let work = TempDir::new().unwrap();
    let intake = intake(&work, Arc::new(MemoryStore::new()), Duration::minutes(30));
    let reporter = RecordingReporter::new();

    assert!(intake.receive(report("u1"), &reporter).await.unwrap().is_some());
    assert!(intake.receive(report("u1"), &reporter).await.unwrap().is_none());
    assert!(intake.receive(report("u2"), &reporter).await.unwrap().is_some());
    assert_eq!(reporter.replies().len(), 2);
}

#[tokio::test]
async fn test_expired_session_creates_no_issue() {
    let work = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let intake = intake(&work, store.clone(), Duration::minutes(30));
    let reporter = RecordingReporter::new();
    let opened = Utc::now();

    let outward = intake
        .receive_at(report("u1"), &reporter, opened)
        .await
        .unwrap()
        .unwrap();
    let result = intake
        .begin_at(&outward, &reporter, opened + Duration::minutes(31))
        .await;

    assert!(matches!(result, Err(IntakeError::SessionExpired(_))));
    assert!(reporter.last_content().unwrap().contains("expired"));
    assert_eq!(store.issue_count().await, 0);

    // The session is gone for good
    assert!(matches!(
        intake.begin(&outward, &reporter).await,
        Err(IntakeError::UnknownSession(_))
    ));
}

#[tokio::test]
async fn test_sweep_and_cancel() {
    let work = TempDir::new().unwrap();
    let intake = intake(&work, Arc::new(MemoryStore::new()), Duration::minutes(5));
    let reporter = RecordingReporter::new();
    let now = Utc::now();

    intake
        .receive_at(report("old"), &reporter, now - Duration::minutes(10))
        .await
        .unwrap();
    let fresh = intake
        .receive_at(report("new"), &reporter, now)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(intake.sweep_at(now).await, 1);
    assert!(intake.cancel(&fresh, &reporter).await);
    assert!(!intake.cancel(&MessageHandle("unknown".into()), &reporter).await);
    assert_eq!(intake.open_sessions().await, 0);
    assert!(reporter.last_content().unwrap().contains("cancelled"));
}

/// Holds every reply until released
#[derive(Default)]
struct GatedReporter {
    release: Notify,
}

#[async_trait]
impl Reporter for GatedReporter {
    async fn reply(&self, _content: &str) -> Result<MessageHandle, ReporterError> {
        self.release.notified().await;
        Ok(MessageHandle("gated-1".into()))
    }

    async fn edit(
        &self,
        handle: &MessageHandle,
        _content: &str,
    ) -> Result<MessageHandle, ReporterError> {
        Ok(handle.clone())
    }
}

#[tokio::test]
async fn test_slow_acknowledgement_does_not_block_other_users() {
    let work = TempDir::new().unwrap();
    let intake = intake(&work, Arc::new(MemoryStore::new()), Duration::minutes(30));
    let gated = GatedReporter::default();

    let slow = intake.receive(report("u1"), &gated);
    tokio::pin!(slow);
    tokio::select! {
        _ = &mut slow => panic!("reply should still be pending"),
        _ = tokio::time::sleep(std::time::Duration::from_millis(50)) => {}
    }

    let fast = tokio::time::timeout(
        std::time::Duration::from_secs(1),
        intake.receive(report("u2"), &RecordingReporter::new()),
    )
    .await
    .expect("intake stalled behind a pending reply")
    .unwrap();
    assert_eq!(fast, Some(MessageHandle("msg-1".into())));

    gated.release.notify_one();
    let slow = slow.await.unwrap();
    assert_eq!(slow, Some(MessageHandle("gated-1".into())));
    assert_eq!(intake.open_sessions().await, 2);
}

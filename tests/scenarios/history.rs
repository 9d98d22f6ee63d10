//! Scenario: finished runs recorded in history

use crate::helpers::*;
use cirun::core::{FailureKind, RunStatus, TriggerEvent};
use cirun::persistence::{InMemoryPersistence, PersistenceBackend, RunRecord};

#[tokio::test]
async fn test_two_successful_records_for_passing_push() {
    let outcome = completed(dispatch_with_mock(&ci_workflow(), TriggerEvent::push("main"), MockRunner::new()).await);
    let store = InMemoryPersistence::new();
    for run in &outcome.runs {
        store.save_run(&RunRecord::from_run(run)).await.unwrap();
    }

    let records = store.list_runs("Rust").await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.status == RunStatus::Succeeded));
    assert!(records.iter().all(|r| r.progress() == 1.0));
}

#[tokio::test]
async fn test_records_for_nightly_build_failure() {
    let runner = MockRunner::failing(vec![FailRule::on_variant("cargo build", "nightly")]);
    let outcome = completed(dispatch_with_mock(&ci_workflow(), TriggerEvent::push("main"), runner).await);
    let store = InMemoryPersistence::new();
    for run in &outcome.runs {
        store.save_run(&RunRecord::from_run(run)).await.unwrap();
    }

    let records = store.list_runs("Rust").await.unwrap();
    let nightly = records.iter().find(|r| r.variant == "toolchain=nightly").unwrap();
    assert_eq!(nightly.status, RunStatus::Failed);
    assert_eq!(nightly.failure_kind, Some(FailureKind::Build));
    assert_eq!(nightly.completed_steps, 2);

    let stable = records.iter().find(|r| r.variant == "toolchain=stable").unwrap();
    assert_eq!(stable.status, RunStatus::Succeeded);
    assert_eq!(stable.failure_kind, None);
}

//! Scenario: which events start the CI workflow

use crate::helpers::*;
use cirun::core::config::WorkflowConfig;
use cirun::core::{EventKind, RunInstance, TriggerEvent};
use cirun::execution::DispatchOutcome;

#[tokio::test]
async fn test_pull_request_to_other_branch_triggers_nothing() {
    let runner = MockRunner::new();
    let outcome = dispatch_with_mock(&ci_workflow(), TriggerEvent::pull_request("develop"), runner.clone()).await;

    match outcome {
        DispatchOutcome::NotTriggered { event } => {
            assert_eq!(event.kind, EventKind::PullRequest);
            assert_eq!(event.branch, "develop");
        }
        DispatchOutcome::Completed(_) => panic!("pull request to develop must not trigger"),
    }
    assert!(runner.invocations().is_empty());
}

#[tokio::test]
async fn test_push_to_feature_branch_triggers_nothing() {
    let outcome = dispatch_with_mock(&ci_workflow(), TriggerEvent::push("feature/login"), MockRunner::new()).await;
    assert!(outcome.outcome().is_none());
}

#[tokio::test]
async fn test_pull_request_to_main_matches_push_matrix() {
    let push = completed(dispatch_with_mock(&ci_workflow(), TriggerEvent::push("main"), MockRunner::new()).await);
    let pr = completed(
        dispatch_with_mock(&ci_workflow(), TriggerEvent::pull_request("refs/heads/main"), MockRunner::new()).await,
    );

    assert_eq!(labels(&push.runs), vec!["toolchain=stable", "toolchain=nightly"]);
    assert_eq!(labels(&push.runs), labels(&pr.runs));
    assert!(pr.passed());
    assert_eq!(pr.event.kind, EventKind::PullRequest);
}

#[test]
fn test_matrix_excluding_every_variant_is_rejected() {
    let yaml = CI_WORKFLOW.replace(
        "toolchain:\n          - stable\n          - nightly\n",
        "toolchain:\n          - stable\n          - nightly\n        exclude:\n          - toolchain: stable\n          - toolchain: nightly\n",
    );
    assert_ne!(yaml, CI_WORKFLOW);
    assert!(WorkflowConfig::from_yaml(&yaml).is_err());
}

fn labels(runs: &[RunInstance]) -> Vec<String> {
    runs.iter().map(|r| r.variant.label()).collect()
}

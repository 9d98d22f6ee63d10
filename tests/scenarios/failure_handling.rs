//! Scenario: the first failing step ends its run instance only

use crate::helpers::*;
use cirun::core::{FailureKind, RunPhase, RunStatus, StepState, TriggerEvent};

#[tokio::test]
async fn test_nightly_build_failure_leaves_stable_untouched() {
    let runner = MockRunner::failing(vec![FailRule::on_variant("cargo build", "nightly")]);
    let outcome = completed(dispatch_with_mock(&ci_workflow(), TriggerEvent::push("main"), runner.clone()).await);

    assert!(!outcome.passed());
    assert_eq!(outcome.succeeded(), 1);
    assert_eq!(outcome.failed(), 1);

    let stable = run_for(&outcome, "stable");
    assert_eq!(stable.state.status, RunStatus::Succeeded);
    assert_eq!(stable.executed_steps(), vec!["install-toolchain", "checkout", "build", "test"]);

    let nightly = run_for(&outcome, "nightly");
    assert_eq!(nightly.state.status, RunStatus::Failed);
    assert_eq!(nightly.phase(), RunPhase::Failure);
    assert_eq!(nightly.executed_steps(), vec!["install-toolchain", "checkout", "build"]);
    assert_eq!(
        steps_where(nightly, |s| matches!(s, StepState::Skipped { .. })),
        vec!["test"]
    );

    let failure = nightly.state.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::Build);
    assert_eq!(failure.step_id, "build");

    // Only stable ever ran `cargo test`
    let tests_run = runner
        .invocations()
        .iter()
        .filter(|i| i.step_id == "test")
        .count();
    assert_eq!(tests_run, 1);
}

#[tokio::test]
async fn test_toolchain_install_failure_skips_everything_else() {
    let runner = MockRunner::failing(vec![FailRule::script("rustup toolchain install")]);
    let outcome = completed(dispatch_with_mock(&ci_workflow(), TriggerEvent::push("main"), runner).await);

    assert_eq!(outcome.failed(), 2);
    for run in &outcome.runs {
        let failure = run.state.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::ToolchainInstall);
        assert_eq!(
            steps_where(run, |s| matches!(s, StepState::Skipped { .. })),
            vec!["checkout", "build", "test"]
        );
    }
}

#[tokio::test]
async fn test_failed_step_records_exit_code_and_output() {
    let runner = MockRunner::failing(vec![FailRule::script("cargo test")]);
    let outcome = completed(dispatch_with_mock(&ci_workflow(), TriggerEvent::push("main"), runner).await);

    let run = run_for(&outcome, "stable");
    assert_eq!(run.state.failure.as_ref().unwrap().kind, FailureKind::Test);
    match &run.step("test").unwrap().state {
        StepState::Failed { exit_code, output, .. } => {
            assert_eq!(*exit_code, Some(101));
            assert!(output.contains("could not compile"));
        }
        other => panic!("expected failed test step, got {:?}", other),
    }
}

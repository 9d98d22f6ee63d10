//! Scenario: real shell processes, no toolchain required

use cirun::core::{FailureKind, RunStatus, TriggerEvent};
use cirun::execution::{ExecutionEngine, RunOptions, SchedulingStrategy, ShellRunner, WorkflowScheduler};
use std::time::{Duration, Instant};

use crate::helpers::{completed, run_for, workflow_from_yaml};

const WORKFLOW: &str = r#"
name: "Shell"
on:
  push:
    branches: [main]
env:
  CARGO_TERM_COLOR: always
jobs:
  build:
    strategy:
      matrix:
        toolchain: [stable, nightly]
    steps:
      - name: Install toolchain
        run: echo "${{ matrix.toolchain }}" > toolchain.txt
      - name: Build
        run: |
          test "$CARGO_TERM_COLOR" = always
          test "$(cat toolchain.txt)" != nightly
          echo built > build.txt
      - name: Test
        run: test -f build.txt
"#;

#[tokio::test]
async fn test_real_shell_nightly_failure() {
    let root = tempfile::tempdir().unwrap();
    let scheduler = WorkflowScheduler::new(ExecutionEngine::new(ShellRunner::new()), SchedulingStrategy::Parallel);

    let outcome = completed(
        scheduler
            .dispatch(&workflow_from_yaml(WORKFLOW), &TriggerEvent::push("main"), &RunOptions::new(".", root.path()))
            .await
            .unwrap(),
    );

    let stable = run_for(&outcome, "stable");
    assert_eq!(stable.state.status, RunStatus::Succeeded);
    assert_eq!(stable.executed_steps(), vec!["install-toolchain", "build", "test"]);

    let nightly = run_for(&outcome, "nightly");
    assert_eq!(nightly.state.status, RunStatus::Failed);
    let failure = nightly.state.failure.as_ref().unwrap();
    assert_eq!(failure.step_id, "build");
    // No cargo invocation, so the step is classified as a plain command
    assert_eq!(failure.kind, FailureKind::Command);
    assert_eq!(nightly.executed_steps(), vec!["install-toolchain", "build"]);
}

const BACKGROUND_WORKFLOW: &str = r#"
name: "Background"
on: push
jobs:
  build:
    timeout-minutes: 1
    steps:
      - name: Start server
        run: |
          sleep 60 &
          echo started
      - name: Test
        run: echo tested
"#;

#[tokio::test]
async fn test_background_process_does_not_stall_the_run() {
    let root = tempfile::tempdir().unwrap();
    let scheduler = WorkflowScheduler::new(ExecutionEngine::new(ShellRunner::new()), SchedulingStrategy::Parallel);

    let started = Instant::now();
    let outcome = completed(
        scheduler
            .dispatch(
                &workflow_from_yaml(BACKGROUND_WORKFLOW),
                &TriggerEvent::push("main"),
                &RunOptions::new(".", root.path()),
            )
            .await
            .unwrap(),
    );

    assert!(started.elapsed() < Duration::from_secs(30));
    let run = &outcome.runs[0];
    assert_eq!(run.state.status, RunStatus::Succeeded);
    assert_eq!(run.executed_steps(), vec!["start-server", "test"]);
}

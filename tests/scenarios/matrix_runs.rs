//! Scenario: one independent run instance per toolchain

use crate::helpers::*;
use cirun::core::{RunPhase, RunStatus, TriggerEvent};
use std::collections::HashSet;

#[tokio::test]
async fn test_push_to_main_runs_each_toolchain_once() {
    let runner = MockRunner::new();
    let outcome = completed(dispatch_with_mock(&ci_workflow(), TriggerEvent::push("main"), runner.clone()).await);

    assert_eq!(outcome.runs.len(), 2);
    assert!(outcome.passed());
    assert_eq!(outcome.succeeded(), 2);

    for toolchain in ["stable", "nightly"] {
        let run = run_for(&outcome, toolchain);
        assert_eq!(run.state.status, RunStatus::Succeeded);
        assert_eq!(run.phase(), RunPhase::Success);
        assert_eq!(run.state.completed_steps, 4);
    }

    // Eight steps total, each run in its own workspace
    let invocations = runner.invocations();
    assert_eq!(invocations.len(), 8);
    let workspaces: HashSet<_> = invocations.iter().map(|i| i.working_dir.clone()).collect();
    assert_eq!(workspaces.len(), 2);

    let ids: HashSet<_> = outcome.runs.iter().map(|r| r.run_id).collect();
    assert_eq!(ids.len(), 2);
}

#[tokio::test]
async fn test_toolchain_step_installs_variant_channel() {
    let runner = MockRunner::new();
    completed(dispatch_with_mock(&ci_workflow(), TriggerEvent::push("main"), runner.clone()).await);

    let installs: Vec<String> = runner
        .invocations()
        .into_iter()
        .filter(|i| i.step_id == "install-toolchain")
        .filter_map(|i| i.script().map(str::to_string))
        .collect();
    assert_eq!(installs.len(), 2);
    assert!(installs.iter().any(|s| s.contains("rustup toolchain install stable")));
    assert!(installs.iter().any(|s| s.contains("rustup toolchain install nightly")));
    assert!(installs.iter().all(|s| !s.contains("${{")));
}

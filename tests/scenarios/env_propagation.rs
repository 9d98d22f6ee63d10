//! Scenario: environment and step order seen by the runner

use crate::helpers::*;
use cirun::core::TriggerEvent;

#[tokio::test]
async fn test_cargo_term_color_reaches_every_step() {
    let runner = MockRunner::new();
    completed(dispatch_with_mock(&ci_workflow(), TriggerEvent::push("main"), runner.clone()).await);

    let invocations = runner.invocations();
    assert!(!invocations.is_empty());
    for invocation in &invocations {
        assert_eq!(
            invocation.env.get("CARGO_TERM_COLOR").map(String::as_str),
            Some("always"),
            "step {} is missing CARGO_TERM_COLOR",
            invocation.step_id
        );
        assert_eq!(invocation.env.get("CI").map(String::as_str), Some("true"));
        assert_eq!(invocation.env.get("GITHUB_EVENT_NAME").map(String::as_str), Some("push"));
        assert_eq!(invocation.env.get("GITHUB_REF").map(String::as_str), Some("refs/heads/main"));
    }
}

#[tokio::test]
async fn test_steps_run_in_declared_order_per_variant() {
    let runner = MockRunner::new();
    completed(dispatch_with_mock(&ci_workflow(), TriggerEvent::push("main"), runner.clone()).await);

    let invocations = runner.invocations();
    let mut workspaces: Vec<_> = invocations.iter().map(|i| i.working_dir.clone()).collect();
    workspaces.sort();
    workspaces.dedup();
    assert_eq!(workspaces.len(), 2);

    for workspace in workspaces {
        let order: Vec<&str> = invocations
            .iter()
            .filter(|i| i.working_dir == workspace)
            .map(|i| i.step_id.as_str())
            .collect();
        assert_eq!(order, vec!["install-toolchain", "checkout", "build", "test"]);
    }
}

#[tokio::test]
async fn test_build_and_test_are_verbose() {
    let runner = MockRunner::new();
    completed(dispatch_with_mock(&ci_workflow(), TriggerEvent::pull_request("main"), runner.clone()).await);

    for invocation in runner.invocations() {
        let script = invocation.script().unwrap_or_default();
        if invocation.step_id == "build" {
            assert_eq!(script, "cargo build --verbose");
        }
        if invocation.step_id == "test" {
            assert_eq!(script, "cargo test --verbose");
        }
    }
}

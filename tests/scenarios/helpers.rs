//! Test utilities for workflow scenarios

use async_trait::async_trait;
use cirun::core::config::WorkflowConfig;
use cirun::core::{RunInstance, StepState, TriggerEvent, Workflow};
use cirun::execution::{
    CommandOutput, DispatchOutcome, ExecutionEngine, RunOptions, RunnerError, SchedulingStrategy,
    StepInvocation, StepRunner, WorkflowOutcome, WorkflowScheduler,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// The workflow checked in for this repository
pub const CI_WORKFLOW: &str = include_str!("../../.github/workflows/ci.yml");

/// Condition under which the mock runner reports a failing exit code
#[derive(Debug, Clone)]
pub struct FailRule {
    /// Substring of the rendered script
    pub script_contains: String,

    /// Substring of the run's workspace directory name (`<job>-<variant>-<id>`)
    pub variant: Option<String>,
}

impl FailRule {
    pub fn script(marker: &str) -> Self {
        Self {
            script_contains: marker.to_string(),
            variant: None,
        }
    }

    pub fn on_variant(marker: &str, variant: &str) -> Self {
        Self {
            script_contains: marker.to_string(),
            variant: Some(variant.to_string()),
        }
    }

    fn matches(&self, invocation: &StepInvocation) -> bool {
        let script = invocation.script().unwrap_or_default();
        if !script.contains(&self.script_contains) {
            return false;
        }
        match &self.variant {
            None => true,
            Some(variant) => invocation
                .working_dir
                .file_name()
                .map(|name| name.to_string_lossy().contains(&format!("-{}-", variant)))
                .unwrap_or(false),
        }
    }
}

/// Runner that records every invocation instead of spawning processes
#[derive(Clone, Default)]
pub struct MockRunner {
    fail_rules: Arc<Vec<FailRule>>,
    invocations: Arc<Mutex<Vec<StepInvocation>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(rules: Vec<FailRule>) -> Self {
        Self {
            fail_rules: Arc::new(rules),
            invocations: Arc::default(),
        }
    }

    /// Every invocation seen so far
    pub fn invocations(&self) -> Vec<StepInvocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl StepRunner for MockRunner {
    async fn run(&self, invocation: &StepInvocation) -> Result<CommandOutput, RunnerError> {
        self.invocations.lock().unwrap().push(invocation.clone());
        let failed = self.fail_rules.iter().any(|rule| rule.matches(invocation));

        Ok(CommandOutput {
            exit_code: if failed { 101 } else { 0 },
            stdout: format!("ran {}", invocation.step_id),
            stderr: if failed { "error: could not compile".to_string() } else { String::new() },
            duration: Duration::from_millis(1),
        })
    }
}

/// Parse a workflow from YAML
pub fn workflow_from_yaml(yaml: &str) -> Workflow {
    WorkflowConfig::from_yaml(yaml)
        .expect("workflow should parse")
        .to_workflow()
        .expect("workflow should convert")
}

/// The checked-in CI workflow
pub fn ci_workflow() -> Workflow {
    workflow_from_yaml(CI_WORKFLOW)
}

/// Dispatch an event through a mock runner in a scratch workspace root
pub async fn dispatch_with_mock(
    workflow: &Workflow,
    event: TriggerEvent,
    runner: MockRunner,
) -> DispatchOutcome {
    let root = tempfile::tempdir().unwrap();
    let scheduler = WorkflowScheduler::new(ExecutionEngine::new(runner), SchedulingStrategy::Parallel);
    scheduler
        .dispatch(workflow, &event, &RunOptions::new(".", root.path()))
        .await
        .expect("dispatch should not error")
}

/// Unwrap a completed dispatch
pub fn completed(outcome: DispatchOutcome) -> WorkflowOutcome {
    match outcome {
        DispatchOutcome::Completed(outcome) => outcome,
        DispatchOutcome::NotTriggered { event } => {
            panic!("expected {} on '{}' to trigger", event.kind, event.branch)
        }
    }
}

/// Find the run instance for a toolchain
pub fn run_for<'a>(outcome: &'a WorkflowOutcome, toolchain: &str) -> &'a RunInstance {
    outcome
        .runs
        .iter()
        .find(|run| run.variant.get("toolchain").map(String::as_str) == Some(toolchain))
        .unwrap_or_else(|| panic!("no run for toolchain {}", toolchain))
}

/// Step IDs in plan order that reached the given predicate
pub fn steps_where(run: &RunInstance, predicate: impl Fn(&StepState) -> bool) -> Vec<String> {
    run.steps
        .iter()
        .filter(|step| predicate(&step.state))
        .map(|step| step.id.clone())
        .collect()
}

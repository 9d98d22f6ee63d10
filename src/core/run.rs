//! Run instance - one matrix variant of one job, triggered by one event

use crate::core::{
    context::RunContext,
    matrix::MatrixVariant,
    state::{RunPhase, RunState, RunStatus, StepState},
    step::Step,
    trigger::TriggerEvent,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A single execution of a job's step sequence for one matrix variant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInstance {
    /// Unique run ID
    pub run_id: Uuid,

    /// Workflow name
    pub workflow_name: String,

    /// Job identifier
    pub job_id: String,

    /// Matrix variant this run is parameterized by
    pub variant: MatrixVariant,

    /// Event that triggered the run
    pub event: TriggerEvent,

    /// Workflow and job environment (templates, job overriding workflow)
    pub env: BTreeMap<String, String>,

    /// Steps in execution order
    pub steps: Vec<Step>,

    /// Execution state
    pub state: RunState,
}

impl RunInstance {
    /// Create a queued run instance
    pub fn new(
        workflow_name: &str,
        job_id: &str,
        variant: MatrixVariant,
        event: TriggerEvent,
        env: BTreeMap<String, String>,
        steps: Vec<Step>,
    ) -> Self {
        let state = RunState::new(steps.len());
        Self {
            run_id: Uuid::new_v4(),
            workflow_name: workflow_name.to_string(),
            job_id: job_id.to_string(),
            variant,
            event,
            env,
            steps,
            state,
        }
    }

    /// Human-readable name, e.g. `build (toolchain=nightly)`
    pub fn display_name(&self) -> String {
        if self.variant.values.is_empty() {
            self.job_id.clone()
        } else {
            format!("{} ({})", self.job_id, self.variant.label())
        }
    }

    /// Get a step by ID
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Base context for rendering this run's templates, with the
    /// run-level environment applied
    pub fn base_context(&self) -> RunContext {
        let mut context = RunContext::for_variant(&self.variant, &self.event);
        context.extend_env(&self.env);
        context
    }

    /// Context for a specific step: run environment plus step environment
    pub fn context_for_step(&self, index: usize) -> RunContext {
        let mut context = self.base_context();
        if let Some(step) = self.steps.get(index) {
            context.extend_env(&step.env);
        }
        context
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> RunPhase {
        match self.state.status {
            RunStatus::Queued => RunPhase::Queued,
            RunStatus::Succeeded => RunPhase::Success,
            RunStatus::Failed => RunPhase::Failure,
            RunStatus::Running => self
                .state
                .current_step
                .and_then(|i| self.steps.get(i))
                .map(|s| RunPhase::from(s.kind))
                .unwrap_or(RunPhase::Queued),
        }
    }

    /// IDs of steps that actually executed, in order
    pub fn executed_steps(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.state.was_executed())
            .map(|s| s.id.as_str())
            .collect()
    }

    /// Check if the run has finished
    pub fn is_complete(&self) -> bool {
        self.state.status.is_terminal() && self.steps.iter().all(|s| s.state.is_terminal())
    }

    /// Check if the run succeeded
    pub fn succeeded(&self) -> bool {
        self.state.status == RunStatus::Succeeded
    }

    /// Mark every pending step as skipped
    pub fn skip_remaining(&mut self, reason: &str) {
        for step in &mut self.steps {
            if matches!(step.state, StepState::Pending) {
                step.state = StepState::Skipped {
                    reason: reason.to_string(),
                };
            }
        }
    }
}

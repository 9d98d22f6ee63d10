//! Workflow domain model

use crate::core::{
    config::WorkflowConfig,
    matrix::Matrix,
    run::RunInstance,
    step::Step,
    trigger::{TriggerEvent, TriggerSet},
};
use std::collections::BTreeMap;

/// A job: one step sequence, fanned out over its matrix
#[derive(Debug, Clone)]
pub struct Job {
    /// Job identifier (key under `jobs:`)
    pub id: String,

    /// Display name
    pub name: String,

    /// Requested runner label (informational)
    pub runs_on: Option<String>,

    /// Job-level environment
    pub env: BTreeMap<String, String>,

    /// Build matrix
    pub matrix: Matrix,

    /// Maximum variants run at once
    pub max_parallel: Option<usize>,

    /// Step templates, in order
    pub steps: Vec<Step>,
}

/// A workflow definition
#[derive(Debug, Clone)]
pub struct Workflow {
    /// Workflow name
    pub name: String,

    /// Events that start the workflow
    pub triggers: TriggerSet,

    /// Workflow-level environment
    pub env: BTreeMap<String, String>,

    /// Jobs ordered by ID
    pub jobs: Vec<Job>,
}

impl Workflow {
    /// Create a workflow from configuration
    pub fn from_config(config: &WorkflowConfig) -> anyhow::Result<Self> {
        config.to_workflow()
    }

    /// Check if an event starts this workflow
    pub fn is_triggered_by(&self, event: &TriggerEvent) -> bool {
        self.triggers.matches(event)
    }

    /// Plan the run instances an event produces: one per job and matrix
    /// variant, or none when the event does not match the triggers
    pub fn plan(&self, event: &TriggerEvent) -> Vec<RunInstance> {
        if !self.is_triggered_by(event) {
            return Vec::new();
        }

        let mut runs = Vec::new();
        for job in &self.jobs {
            let mut env = self.env.clone();
            env.extend(job.env.clone());

            for variant in job.matrix.expand() {
                runs.push(RunInstance::new(
                    &self.name,
                    &job.id,
                    variant,
                    event.clone(),
                    env.clone(),
                    job.steps.clone(),
                ));
            }
        }
        runs
    }
}

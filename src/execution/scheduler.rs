//! Workflow scheduler - turns an event into concurrently executed run instances

use crate::{
    core::{RunInstance, RunStatus, TriggerEvent, Workflow},
    execution::{ExecutionEngine, RunOptions, StepRunner},
};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Strategy for scheduling run instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingStrategy {
    /// Execute run instances one at a time
    Sequential,

    /// Execute all run instances at once
    #[default]
    Parallel,

    /// Limited parallelism (max N concurrent run instances)
    LimitedParallel(usize),
}

impl SchedulingStrategy {
    /// Maximum number of concurrent run instances
    pub fn limit(&self) -> usize {
        match self {
            SchedulingStrategy::Sequential => 1,
            SchedulingStrategy::Parallel => Semaphore::MAX_PERMITS,
            SchedulingStrategy::LimitedParallel(max) => (*max).max(1),
        }
    }
}

/// Finished run instances of one dispatched event
#[derive(Debug, Clone)]
pub struct WorkflowOutcome {
    /// Workflow name
    pub workflow_name: String,

    /// Event that was dispatched
    pub event: TriggerEvent,

    /// Run instances in plan order
    pub runs: Vec<RunInstance>,
}

impl WorkflowOutcome {
    /// Number of successful run instances
    pub fn succeeded(&self) -> usize {
        self.runs.iter().filter(|r| r.state.status == RunStatus::Succeeded).count()
    }

    /// Number of failed run instances
    pub fn failed(&self) -> usize {
        self.runs.iter().filter(|r| r.state.status == RunStatus::Failed).count()
    }

    /// Whether the overall check passed (every run instance succeeded)
    pub fn passed(&self) -> bool {
        !self.runs.is_empty() && self.failed() == 0 && self.succeeded() == self.runs.len()
    }
}

/// Result of dispatching an event to a workflow
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// The event did not match the workflow's triggers
    NotTriggered { event: TriggerEvent },
    /// Run instances were executed
    Completed(WorkflowOutcome),
}

impl DispatchOutcome {
    /// The workflow outcome, if the event triggered a run
    pub fn outcome(&self) -> Option<&WorkflowOutcome> {
        match self {
            DispatchOutcome::NotTriggered { .. } => None,
            DispatchOutcome::Completed(outcome) => Some(outcome),
        }
    }
}

/// Scheduler dispatching events to run instances
pub struct WorkflowScheduler<R> {
    engine: Arc<ExecutionEngine<R>>,
    strategy: SchedulingStrategy,
}

impl<R: StepRunner + 'static> WorkflowScheduler<R> {
    pub fn new(engine: ExecutionEngine<R>, strategy: SchedulingStrategy) -> Self {
        Self {
            engine: Arc::new(engine),
            strategy,
        }
    }

    /// Dispatch an event: check triggers, expand the matrix and run every
    /// variant as an independent instance
    pub async fn dispatch(
        &self,
        workflow: &Workflow,
        event: &TriggerEvent,
        options: &RunOptions,
    ) -> Result<DispatchOutcome> {
        if !workflow.is_triggered_by(event) {
            info!(
                "Event {} on '{}' does not trigger workflow {}",
                event.kind, event.branch, workflow.name
            );
            return Ok(DispatchOutcome::NotTriggered {
                event: event.clone(),
            });
        }

        let runs = workflow.plan(event);
        if runs.is_empty() {
            warn!(
                "Event {} on '{}' triggers workflow {} but its matrix has no variants",
                event.kind, event.branch, workflow.name
            );
        }

        info!(
            "Dispatching {} run instance(s) of {} for {} on '{}'",
            runs.len(),
            workflow.name,
            event.kind,
            event.branch
        );

        let runs = self.execute_all(workflow, runs, options).await?;

        Ok(DispatchOutcome::Completed(WorkflowOutcome {
            workflow_name: workflow.name.clone(),
            event: event.clone(),
            runs,
        }))
    }

    /// Execute planned run instances and return them in plan order
    pub async fn execute_all(
        &self,
        workflow: &Workflow,
        runs: Vec<RunInstance>,
        options: &RunOptions,
    ) -> Result<Vec<RunInstance>> {
        let global = Arc::new(Semaphore::new(self.strategy.limit()));
        let per_job: HashMap<String, Arc<Semaphore>> = workflow
            .jobs
            .iter()
            .map(|job| {
                let limit = job.max_parallel.unwrap_or(Semaphore::MAX_PERMITS);
                (job.id.clone(), Arc::new(Semaphore::new(limit)))
            })
            .collect();
        let options = Arc::new(options.clone());

        let mut tasks = JoinSet::new();
        for (index, mut run) in runs.into_iter().enumerate() {
            let engine = self.engine.clone();
            let global = global.clone();
            let job_limit = per_job.get(&run.job_id).cloned();
            let options = options.clone();

            tasks.spawn(async move {
                let _job_permit = match job_limit {
                    Some(semaphore) => Some(semaphore.acquire_owned().await),
                    None => None,
                };
                let _permit = global.acquire_owned().await;
                engine.execute(&mut run, &options).await;
                (index, run)
            });
        }

        let mut finished = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            let (index, run) = joined.context("Run instance task panicked")?;
            if !run.succeeded() {
                warn!("Run {} did not succeed", run.display_name());
            }
            finished.push((index, run));
        }

        finished.sort_by_key(|(index, _)| *index);
        Ok(finished.into_iter().map(|(_, run)| run).collect())
    }
}

//! Persistence layer for run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteExecutionStore;

use crate::core::{FailureKind, RunInstance, RunStatus};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Record of a finished run instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique run ID
    pub run_id: Uuid,

    /// Workflow name
    pub workflow_name: String,

    /// Job identifier
    pub job_id: String,

    /// Matrix variant label
    pub variant: String,

    /// Triggering event kind (`push` / `pull_request`)
    pub event: String,

    /// Target branch of the event
    pub branch: String,

    /// Final status
    pub status: RunStatus,

    /// Failure category, for failed runs
    pub failure_kind: Option<FailureKind>,

    /// Failing step, for failed runs
    pub failed_step: Option<String>,

    /// When execution started
    pub started_at: DateTime<Utc>,

    /// When execution completed (if complete)
    pub completed_at: Option<DateTime<Utc>>,

    /// Number of completed steps
    pub completed_steps: usize,

    /// Total number of steps
    pub total_steps: usize,
}

impl RunRecord {
    /// Summarize a run instance
    pub fn from_run(run: &RunInstance) -> Self {
        let failure = run.state.failure.as_ref();
        Self {
            run_id: run.run_id,
            workflow_name: run.workflow_name.clone(),
            job_id: run.job_id.clone(),
            variant: run.variant.label(),
            event: run.event.kind.as_str().to_string(),
            branch: run.event.branch.clone(),
            status: run.state.status,
            failure_kind: failure.map(|f| f.kind),
            failed_step: failure.map(|f| f.step_id.clone()),
            started_at: run.state.started_at.unwrap_or_else(Utc::now),
            completed_at: run.state.completed_at,
            completed_steps: run.state.completed_steps,
            total_steps: run.state.total_steps,
        }
    }

    /// Progress (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        self.completed_steps as f64 / self.total_steps as f64
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a run record
    async fn save_run(&self, record: &RunRecord) -> Result<()>;

    /// Load a run record by ID
    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunRecord>>;

    /// List run records for a workflow, newest first
    async fn list_runs(&self, workflow_name: &str) -> Result<Vec<RunRecord>>;

    /// List all workflow names
    async fn list_workflows(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
pub struct InMemoryPersistence {
    runs: tokio::sync::RwLock<std::collections::HashMap<Uuid, RunRecord>>,
    by_workflow: tokio::sync::RwLock<std::collections::BTreeMap<String, Vec<Uuid>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            runs: tokio::sync::RwLock::new(std::collections::HashMap::new()),
            by_workflow: tokio::sync::RwLock::new(std::collections::BTreeMap::new()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, record: &RunRecord) -> Result<()> {
        let mut runs = self.runs.write().await;
        let is_new = runs.insert(record.run_id, record.clone()).is_none();

        if is_new {
            let mut by_workflow = self.by_workflow.write().await;
            by_workflow
                .entry(record.workflow_name.clone())
                .or_default()
                .push(record.run_id);
        }

        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunRecord>> {
        let runs = self.runs.read().await;
        Ok(runs.get(&run_id).cloned())
    }

    async fn list_runs(&self, workflow_name: &str) -> Result<Vec<RunRecord>> {
        let runs = self.runs.read().await;
        let by_workflow = self.by_workflow.read().await;

        let mut result: Vec<RunRecord> = by_workflow
            .get(workflow_name)
            .map(|ids| ids.iter().filter_map(|id| runs.get(id).cloned()).collect())
            .unwrap_or_default();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn list_workflows(&self) -> Result<Vec<String>> {
        let by_workflow = self.by_workflow.read().await;
        Ok(by_workflow.keys().cloned().collect())
    }
}

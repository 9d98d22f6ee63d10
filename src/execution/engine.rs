//! Main execution engine - drives one run instance through its steps

use crate::{
    core::{FailureKind, RunFailure, RunInstance, RunStatus, StepState},
    execution::{ExecutionResult, StepExecutor, StepRunner},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Options shared by every run instance of a dispatch
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Repository checked out by checkout steps (absolute path or URL)
    pub repository: String,

    /// Directory under which each run gets its own workspace
    pub workspace_root: PathBuf,

    /// Leave run workspaces on disk after the run finishes
    pub keep_workspaces: bool,
}

impl RunOptions {
    /// Local repository paths are resolved against the current directory,
    /// since checkout runs inside the run's own workspace
    pub fn new(repository: impl Into<String>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            repository: resolve_repository(&repository.into()),
            workspace_root: workspace_root.into(),
            keep_workspaces: false,
        }
    }

    /// Keep or remove run workspaces after each run
    pub fn keeping_workspaces(mut self, keep: bool) -> Self {
        self.keep_workspaces = keep;
        self
    }

    /// Default workspace root under the user's cache directory
    pub fn default_workspace_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("cirun")
            .join("workspaces")
    }

    /// Workspace directory for a run instance
    pub fn workspace_for(&self, run: &RunInstance) -> PathBuf {
        let slug = run.variant.slug();
        let short_id: String = run.run_id.simple().to_string().chars().take(8).collect();
        let dir = if slug.is_empty() {
            format!("{}-{}", run.job_id, short_id)
        } else {
            format!("{}-{}-{}", run.job_id, slug, short_id)
        };
        self.workspace_root.join(dir)
    }
}

/// Whether a repository reference is a remote URL rather than a local path
fn is_remote(repository: &str) -> bool {
    repository.contains("://")
        || repository
            .split_once(':')
            .is_some_and(|(host, _)| host.contains('@') && !host.contains('/'))
}

/// Absolute form of a local repository path; URLs pass through untouched
fn resolve_repository(repository: &str) -> String {
    if is_remote(repository) {
        return repository.to_string();
    }
    let path = Path::new(repository);
    let resolved = std::fs::canonicalize(path).or_else(|_| {
        std::env::current_dir().map(|cwd| cwd.join(path))
    });
    match resolved {
        Ok(path) => path.display().to_string(),
        Err(e) => {
            warn!("Could not resolve repository path {}: {}", repository, e);
            repository.to_string()
        }
    }
}

/// Events that can occur during a run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Uuid,
        name: String,
    },
    StepStarted {
        run_id: Uuid,
        step_id: String,
        step_name: String,
    },
    StepOutput {
        run_id: Uuid,
        step_id: String,
        output: String,
    },
    StepCompleted {
        run_id: Uuid,
        step_id: String,
    },
    StepFailed {
        run_id: Uuid,
        step_id: String,
        kind: FailureKind,
        error: String,
    },
    StepSkipped {
        run_id: Uuid,
        step_id: String,
    },
    RunCompleted {
        run_id: Uuid,
        name: String,
        status: RunStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Run instance execution engine
pub struct ExecutionEngine<R> {
    executor: Arc<StepExecutor<R>>,
    event_handlers: Arc<Mutex<Vec<EventHandler>>>,
}

impl<R: StepRunner + 'static> ExecutionEngine<R> {
    pub fn new(runner: R) -> Self {
        Self {
            executor: Arc::new(StepExecutor::new(runner)),
            event_handlers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add an event handler
    pub async fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.lock().await.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    async fn emit_event(&self, event: ExecutionEvent) {
        let handlers = self.event_handlers.lock().await;
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }

    /// Execute a run instance to completion.
    ///
    /// Steps run strictly in order. The first failing step fails the run and
    /// every later step is skipped; there are no retries.
    pub async fn execute(&self, run: &mut RunInstance, options: &RunOptions) -> RunStatus {
        let run_id = run.run_id;
        let name = run.display_name();

        info!("Starting run {} ({})", name, run_id);
        self.emit_event(ExecutionEvent::RunStarted {
            run_id,
            name: name.clone(),
        })
        .await;

        run.state.start();

        let workspace = options.workspace_for(run);
        if let Err(e) = tokio::fs::create_dir_all(&workspace).await {
            error!("Could not create workspace {}: {}", workspace.display(), e);
            let error = format!("Could not create workspace {}: {}", workspace.display(), e);
            if !run.steps.is_empty() {
                self.fail_step(run, 0, error, None, String::new()).await;
            }
        } else {
            for index in 0..run.steps.len() {
                if !self.execute_step(run, index, &workspace, &options.repository).await {
                    break;
                }
            }
        }

        if run.state.status == RunStatus::Running {
            run.state.succeed();
        }

        if !options.keep_workspaces {
            if let Err(e) = tokio::fs::remove_dir_all(&workspace).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Could not remove workspace {}: {}", workspace.display(), e);
                }
            }
        }

        let status = run.state.status;
        info!("Run finished: {} - {:?}", name, status);
        self.emit_event(ExecutionEvent::RunCompleted { run_id, name, status })
            .await;

        status
    }

    /// Execute step `index`; returns false when the run has failed
    async fn execute_step(
        &self,
        run: &mut RunInstance,
        index: usize,
        workspace: &std::path::Path,
        repository: &str,
    ) -> bool {
        let run_id = run.run_id;
        let step = run.steps[index].clone();
        let started_at = chrono::Utc::now();

        run.state.enter_step(index);
        run.steps[index].state = StepState::Running { started_at };

        self.emit_event(ExecutionEvent::StepStarted {
            run_id,
            step_id: step.id.clone(),
            step_name: step.name.clone(),
        })
        .await;

        let context = run.context_for_step(index);
        let result = self
            .executor
            .execute(&step, &context, workspace, repository)
            .await;

        match result {
            ExecutionResult::Success { output } => {
                run.steps[index].state = StepState::Completed {
                    output: output.clone(),
                    started_at,
                    completed_at: chrono::Utc::now(),
                };
                run.state.step_completed();

                if !output.is_empty() {
                    self.emit_event(ExecutionEvent::StepOutput {
                        run_id,
                        step_id: step.id.clone(),
                        output,
                    })
                    .await;
                }
                self.emit_event(ExecutionEvent::StepCompleted {
                    run_id,
                    step_id: step.id,
                })
                .await;
                true
            }
            ExecutionResult::Failed {
                error,
                exit_code,
                output,
            } => {
                self.fail_step(run, index, error, exit_code, output).await;
                false
            }
        }
    }

    /// Fail step `index`, fail the run and skip everything after it
    async fn fail_step(
        &self,
        run: &mut RunInstance,
        index: usize,
        error: String,
        exit_code: Option<i32>,
        output: String,
    ) {
        let run_id = run.run_id;
        let step = &mut run.steps[index];
        let started_at = match &step.state {
            StepState::Running { started_at } => *started_at,
            _ => chrono::Utc::now(),
        };
        let kind = FailureKind::from(step.kind);
        let step_id = step.id.clone();

        warn!("Step {} failed ({}): {}", step_id, kind, error);
        step.state = StepState::Failed {
            error: error.clone(),
            exit_code,
            output: output.clone(),
            started_at,
            failed_at: chrono::Utc::now(),
        };

        run.state.fail(RunFailure {
            kind,
            step_id: step_id.clone(),
            error: error.clone(),
        });

        if !output.is_empty() {
            self.emit_event(ExecutionEvent::StepOutput {
                run_id,
                step_id: step_id.clone(),
                output,
            })
            .await;
        }
        self.emit_event(ExecutionEvent::StepFailed {
            run_id,
            step_id: step_id.clone(),
            kind,
            error,
        })
        .await;

        run.skip_remaining(&format!("step '{}' failed", step_id));
        let skipped: Vec<String> = run
            .steps
            .iter()
            .filter(|s| matches!(s.state, StepState::Skipped { .. }))
            .map(|s| s.id.clone())
            .collect();
        for step_id in skipped {
            self.emit_event(ExecutionEvent::StepSkipped { run_id, step_id })
                .await;
        }
    }
}

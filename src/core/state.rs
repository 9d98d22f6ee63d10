//! Execution state models

use crate::core::step::StepKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall status of a run instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Planned but not started
    Queued,
    /// Steps are executing
    Running,
    /// Every step completed
    Succeeded,
    /// A step failed; remaining steps were skipped
    Failed,
}

impl RunStatus {
    /// Check if the status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }

    /// Parse the `Debug` form used in storage
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Queued" => Some(RunStatus::Queued),
            "Running" => Some(RunStatus::Running),
            "Succeeded" => Some(RunStatus::Succeeded),
            "Failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// Category of a failed run, named after the step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ToolchainInstall,
    Checkout,
    Build,
    Test,
    Command,
}

impl FailureKind {
    /// Stable storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ToolchainInstall => "toolchain_install",
            FailureKind::Checkout => "checkout",
            FailureKind::Build => "build",
            FailureKind::Test => "test",
            FailureKind::Command => "command",
        }
    }

    /// Parse a storage name
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "toolchain_install" => Some(FailureKind::ToolchainInstall),
            "checkout" => Some(FailureKind::Checkout),
            "build" => Some(FailureKind::Build),
            "test" => Some(FailureKind::Test),
            "command" => Some(FailureKind::Command),
            _ => None,
        }
    }
}

impl From<StepKind> for FailureKind {
    fn from(kind: StepKind) -> Self {
        match kind {
            StepKind::Toolchain => FailureKind::ToolchainInstall,
            StepKind::Checkout => FailureKind::Checkout,
            StepKind::Build => FailureKind::Build,
            StepKind::Test => FailureKind::Test,
            StepKind::Command => FailureKind::Command,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::ToolchainInstall => "toolchain installation failure",
            FailureKind::Checkout => "checkout failure",
            FailureKind::Build => "build failure",
            FailureKind::Test => "test failure",
            FailureKind::Command => "command failure",
        };
        f.write_str(name)
    }
}

/// Where a run instance is in its linear lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    Queued,
    ToolchainInstall,
    Checkout,
    Build,
    Test,
    Command,
    Success,
    Failure,
}

impl From<StepKind> for RunPhase {
    fn from(kind: StepKind) -> Self {
        match kind {
            StepKind::Toolchain => RunPhase::ToolchainInstall,
            StepKind::Checkout => RunPhase::Checkout,
            StepKind::Build => RunPhase::Build,
            StepKind::Test => RunPhase::Test,
            StepKind::Command => RunPhase::Command,
        }
    }
}

/// State of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepState {
    /// Step has not started
    Pending,
    /// Step is currently running
    Running {
        started_at: DateTime<Utc>,
    },
    /// Step exited successfully
    Completed {
        output: String,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Step failed (non-zero exit, timeout, or could not start)
    Failed {
        error: String,
        exit_code: Option<i32>,
        output: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Step never ran because an earlier step failed
    Skipped {
        reason: String,
    },
}

impl StepState {
    /// Check if step is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Completed { .. } | StepState::Failed { .. } | StepState::Skipped { .. }
        )
    }

    /// Whether the step actually executed
    pub fn was_executed(&self) -> bool {
        matches!(
            self,
            StepState::Running { .. } | StepState::Completed { .. } | StepState::Failed { .. }
        )
    }
}

/// Failure details for a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    /// Category of the failure
    pub kind: FailureKind,

    /// Step that failed
    pub step_id: String,

    /// Error message
    pub error: String,
}

/// Overall run state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Current status
    pub status: RunStatus,

    /// Index of the step currently executing
    pub current_step: Option<usize>,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When execution finished
    pub completed_at: Option<DateTime<Utc>>,

    /// Total number of steps
    pub total_steps: usize,

    /// Number of completed steps
    pub completed_steps: usize,

    /// Failure details, set once the run fails
    pub failure: Option<RunFailure>,
}

impl RunState {
    /// Create a queued run state
    pub fn new(total_steps: usize) -> Self {
        Self {
            status: RunStatus::Queued,
            current_step: None,
            started_at: None,
            completed_at: None,
            total_steps,
            completed_steps: 0,
            failure: None,
        }
    }

    /// Mark run as started
    pub fn start(&mut self) {
        if self.status != RunStatus::Queued {
            return;
        }
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Record that step `index` is now executing
    pub fn enter_step(&mut self, index: usize) {
        if self.status == RunStatus::Running {
            self.current_step = Some(index);
        }
    }

    /// Record that the current step completed
    pub fn step_completed(&mut self) {
        if self.status == RunStatus::Running {
            self.completed_steps += 1;
        }
    }

    /// Mark run as succeeded
    pub fn succeed(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = RunStatus::Succeeded;
        self.current_step = None;
        self.completed_at = Some(Utc::now());
    }

    /// Mark run as failed
    pub fn fail(&mut self, failure: RunFailure) {
        if self.status.is_terminal() {
            return;
        }
        self.status = RunStatus::Failed;
        self.failure = Some(failure);
        self.completed_at = Some(Utc::now());
    }

    /// Calculate progress (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        self.completed_steps as f64 / self.total_steps as f64
    }
}

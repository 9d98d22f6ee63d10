//! Workflow execution: runners, steps, run instances and dispatch

pub mod engine;
pub mod executor;
pub mod runner;
pub mod scheduler;

pub use engine::{ExecutionEngine, ExecutionEvent, RunOptions};
pub use executor::{ExecutionResult, StepExecutor};
pub use runner::{CommandOutput, RunnerError, ShellRunner, StepInvocation, StepRunner};
pub use scheduler::{DispatchOutcome, SchedulingStrategy, WorkflowOutcome, WorkflowScheduler};

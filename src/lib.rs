//! cirun - run GitHub-Actions-style CI workflows locally, one independent
//! run instance per matrix variant

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;

// Re-export commonly used types
pub use self::core::{
    config::WorkflowConfig, EventKind, FailureKind, Matrix, MatrixVariant, RunInstance, RunStatus,
    Step, StepState, TriggerEvent, Workflow,
};
pub use self::execution::{
    DispatchOutcome, ExecutionEngine, ExecutionEvent, RunOptions, SchedulingStrategy, ShellRunner,
    StepRunner, WorkflowOutcome, WorkflowScheduler,
};
pub use self::persistence::{InMemoryPersistence, PersistenceBackend, RunRecord};

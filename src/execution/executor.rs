//! Step executor - runs individual steps through a runner

use crate::{
    core::{RunContext, Step},
    execution::runner::{RunnerError, StepInvocation, StepRunner},
};
use std::path::Path;
use tracing::{debug, error, info};

/// Result of executing a step
#[derive(Debug, Clone)]
pub enum ExecutionResult {
    /// Step exited with code 0
    Success { output: String },
    /// Step could not run, timed out, or exited non-zero
    Failed {
        error: String,
        exit_code: Option<i32>,
        output: String,
    },
}

/// Executes a single step
pub struct StepExecutor<R> {
    runner: R,
}

impl<R: StepRunner> StepExecutor<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Build the invocation for a step without running it
    pub fn prepare(
        &self,
        step: &Step,
        context: &RunContext,
        workspace: &Path,
        repository: &str,
    ) -> Result<StepInvocation, String> {
        let script = step.render_script(context, repository)?;
        let (program, leading) = step.shell().command();

        let mut env = context.env.clone();
        env.insert("CI".to_string(), "true".to_string());
        env.insert("GITHUB_WORKSPACE".to_string(), workspace.display().to_string());
        for (key, name) in [
            ("GITHUB_EVENT_NAME", "event_name"),
            ("GITHUB_REF", "ref"),
            ("GITHUB_REF_NAME", "ref_name"),
        ] {
            if let Some(value) = context.github.get(name) {
                env.insert(key.to_string(), value.clone());
            }
        }

        let working_dir = match &step.working_directory {
            Some(dir) => workspace.join(context.render(dir)),
            None => workspace.to_path_buf(),
        };

        let mut args: Vec<String> = leading.iter().map(|a| a.to_string()).collect();
        args.push(script);

        Ok(StepInvocation {
            step_id: step.id.clone(),
            program: program.to_string(),
            args,
            env,
            working_dir,
            timeout_secs: step.timeout_secs,
        })
    }

    /// Execute a step and return the result
    pub async fn execute(
        &self,
        step: &Step,
        context: &RunContext,
        workspace: &Path,
        repository: &str,
    ) -> ExecutionResult {
        info!("Executing step: {}", step.id);

        let invocation = match self.prepare(step, context, workspace, repository) {
            Ok(invocation) => invocation,
            Err(e) => {
                error!("Could not prepare step {}: {}", step.id, e);
                return ExecutionResult::Failed {
                    error: e,
                    exit_code: None,
                    output: String::new(),
                };
            }
        };
        debug!("Script for step {}: {:?}", step.id, invocation.script());

        match self.runner.run(&invocation).await {
            Ok(output) if output.success() => {
                info!("Step {} completed in {:?}", step.id, output.duration);
                ExecutionResult::Success {
                    output: output.combined(),
                }
            }
            Ok(output) => ExecutionResult::Failed {
                error: format!("exited with code {}", output.exit_code),
                exit_code: Some(output.exit_code),
                output: output.combined(),
            },
            Err(e) => {
                error!("Runner error for step {}: {}", step.id, e);
                let error = match &e {
                    RunnerError::Timeout(secs) => format!("Timeout after {} seconds", secs),
                    other => other.to_string(),
                };
                ExecutionResult::Failed {
                    error,
                    exit_code: None,
                    output: String::new(),
                }
            }
        }
    }
}

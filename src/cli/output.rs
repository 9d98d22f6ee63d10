//! CLI output formatting

use crate::{
    core::{RunInstance, RunStatus, StepState},
    execution::ExecutionEvent,
    persistence::RunRecord,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use uuid::Uuid;

pub use console::style;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Lines of step output shown per step
pub const MAX_OUTPUT_LINES: usize = 20;

/// Create a progress bar over `total` run instances
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    if let Ok(bar_style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        progress.set_style(bar_style.progress_chars("#>-"));
    }
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

fn short_id(id: &Uuid) -> String {
    id.simple().to_string().chars().take(8).collect()
}

/// Format a step state for display
pub fn format_step_state(state: &StepState) -> String {
    match state {
        StepState::Pending => style("PENDING").dim().to_string(),
        StepState::Running { .. } => style("RUNNING").yellow().to_string(),
        StepState::Completed { .. } => style("COMPLETED").green().to_string(),
        StepState::Failed { .. } => style("FAILED").red().to_string(),
        StepState::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Queued => style("QUEUED").dim().to_string(),
        RunStatus::Running => style("RUNNING").yellow().to_string(),
        RunStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        RunStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// One-line summary of a finished run instance
pub fn format_run_result(run: &RunInstance) -> String {
    let icon = if run.succeeded() { CHECK } else { CROSS };
    let mut line = format!(
        "{} {} - {}",
        icon,
        style(run.display_name()).bold(),
        format_status(run.state.status)
    );
    if let Some(failure) = &run.state.failure {
        line.push_str(&format!(
            " ({} in step {})",
            failure.kind,
            style(&failure.step_id).red()
        ));
    }
    line
}

/// Format a run record for display
pub fn format_run_record(record: &RunRecord) -> String {
    let status_icon = match record.status {
        RunStatus::Succeeded => CHECK,
        RunStatus::Failed => CROSS,
        RunStatus::Running => SPINNER,
        RunStatus::Queued => INFO,
    };

    let mut line = format!(
        "{} {} - {} / {} [{}] - {} on {} - {} ({}/{})",
        status_icon,
        style(short_id(&record.run_id)).dim(),
        style(&record.workflow_name).bold(),
        record.job_id,
        style(&record.variant).cyan(),
        record.event,
        record.branch,
        format_status(record.status),
        record.completed_steps,
        record.total_steps,
    );
    if let (Some(kind), Some(step)) = (record.failure_kind, &record.failed_step) {
        line.push_str(&format!(" - {} in {}", kind, style(step).red()));
    }
    line
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::RunStarted { run_id, name } => format!(
            "{} Starting {} ({})",
            ROCKET,
            style(name).bold(),
            style(short_id(run_id)).dim()
        ),
        ExecutionEvent::StepStarted {
            run_id,
            step_id,
            step_name,
        } => format!(
            "{} [{}] {} {}",
            SPINNER,
            style(short_id(run_id)).dim(),
            style(step_name).cyan(),
            style(format!("({})", step_id)).dim()
        ),
        ExecutionEvent::StepOutput {
            run_id,
            step_id,
            output,
        } => format!(
            "{} [{}] Output from {}:\n{}",
            INFO,
            style(short_id(run_id)).dim(),
            style(step_id).dim(),
            format_output(output, MAX_OUTPUT_LINES)
        ),
        ExecutionEvent::StepCompleted { run_id, step_id } => format!(
            "{} [{}] {}",
            CHECK,
            style(short_id(run_id)).dim(),
            style(step_id).green()
        ),
        ExecutionEvent::StepFailed {
            run_id,
            step_id,
            kind,
            error,
        } => format!(
            "{} [{}] {} ({}): {}",
            CROSS,
            style(short_id(run_id)).dim(),
            style(step_id).red(),
            kind,
            style(error).dim()
        ),
        ExecutionEvent::StepSkipped { run_id, step_id } => format!(
            "{} [{}] {} skipped",
            SKIP,
            style(short_id(run_id)).dim(),
            style(step_id).dim()
        ),
        ExecutionEvent::RunCompleted { run_id, name, status } => format!(
            "{} {} ({}) {}",
            INFO,
            style(name).bold(),
            style(short_id(run_id)).dim(),
            format_status(*status)
        ),
    }
}

/// Format step output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

/// Format a duration as `1h 2m 3s`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

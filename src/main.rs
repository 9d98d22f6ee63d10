use anyhow::{Context, Result};
use cirun::cli::commands::{HistoryCommand, PlanCommand, RunCommand, ValidateCommand};
use cirun::cli::output::*;
use cirun::cli::{Cli, Command};
use cirun::core::config::WorkflowConfig;
use cirun::core::{StepAction, Workflow};
use cirun::execution::{
    DispatchOutcome, ExecutionEngine, ExecutionEvent, RunOptions, SchedulingStrategy, ShellRunner,
    WorkflowScheduler,
};
use cirun::persistence::{InMemoryPersistence, PersistenceBackend, RunRecord, SqliteExecutionStore};
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let passed = match &cli.command {
        Command::Run(cmd) => run_workflow(cmd).await?,
        Command::Plan(cmd) => plan_workflow(cmd)?,
        Command::Validate(cmd) => validate_workflow(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
    };

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_workflow(cmd: &RunCommand) -> Result<bool> {
    let config = WorkflowConfig::from_file(&cmd.file).context("Failed to load workflow")?;
    let workflow = Workflow::from_config(&config)?;
    let event = cmd.event.to_event(&cmd.branch);

    println!("{} Loaded workflow: {}", INFO, style(&workflow.name).bold());

    let store: Arc<dyn PersistenceBackend> = if cmd.no_history {
        Arc::new(InMemoryPersistence::new())
    } else {
        Arc::new(SqliteExecutionStore::with_default_path().await?)
    };

    let options = RunOptions::new(
        cmd.repository.clone(),
        cmd.workspace_root
            .clone()
            .unwrap_or_else(RunOptions::default_workspace_root),
    )
    .keeping_workspaces(cmd.keep_workspaces);
    info!("Workspaces under {}", options.workspace_root.display());

    let planned = workflow.plan(&event).len();
    let progress = create_progress_bar(planned);

    let engine = ExecutionEngine::new(ShellRunner::new());
    let bar = progress.clone();
    engine
        .add_event_handler(move |event| {
            bar.println(format_execution_event(&event));
            if let ExecutionEvent::StepFailed { .. } = &event {
                bar.set_message("failures reported");
            }
            if let ExecutionEvent::RunCompleted { .. } = &event {
                bar.inc(1);
            }
        })
        .await;

    let strategy = SchedulingStrategy::from(cmd.strategy);
    let scheduler = WorkflowScheduler::new(engine, strategy);
    let dispatched = scheduler.dispatch(&workflow, &event, &options).await?;
    progress.finish_and_clear();

    let outcome = match dispatched {
        DispatchOutcome::NotTriggered { event } => {
            println!(
                "{} {} on '{}' does not trigger {}",
                WARN,
                event.kind,
                event.branch,
                style(&workflow.name).bold()
            );
            return Ok(true);
        }
        DispatchOutcome::Completed(outcome) => outcome,
    };

    if outcome.runs.is_empty() {
        println!(
            "{} {} is triggered but its matrix leaves no variants to run",
            CROSS,
            style(&workflow.name).bold()
        );
        return Ok(false);
    }

    println!();
    for run in &outcome.runs {
        println!("{}", format_run_result(run));
        if !run.succeeded() {
            for step in &run.steps {
                println!("    {} {}", format_step_state(&step.state), step.name);
            }
        }
        store.save_run(&RunRecord::from_run(run)).await?;
    }
    if !cmd.no_history {
        println!("\n{} {} run(s) saved to history", INFO, outcome.runs.len());
    }

    if outcome.passed() {
        println!(
            "\n{} {} passed ({} of {} variants succeeded)",
            CHECK,
            style(&outcome.workflow_name).bold(),
            outcome.succeeded(),
            outcome.runs.len()
        );
        Ok(true)
    } else {
        println!(
            "\n{} {} {} ({} succeeded, {} failed)",
            CROSS,
            style(&outcome.workflow_name).bold(),
            style("failed").red(),
            outcome.succeeded(),
            outcome.failed()
        );
        error!("Check failed for {}", outcome.workflow_name);
        Ok(false)
    }
}

fn plan_workflow(cmd: &PlanCommand) -> Result<bool> {
    let workflow = WorkflowConfig::from_file(&cmd.file)
        .context("Failed to load workflow")?
        .to_workflow()?;
    let event = cmd.event.to_event(&cmd.branch);
    let runs = workflow.plan(&event);

    if cmd.json {
        let data: Vec<serde_json::Value> = runs
            .iter()
            .map(|run| {
                let steps: Vec<serde_json::Value> = run
                    .steps
                    .iter()
                    .enumerate()
                    .map(|(index, step)| {
                        serde_json::json!({
                            "id": step.id,
                            "name": step.name,
                            "kind": step.kind.to_string(),
                            "script": step.render_script(&run.context_for_step(index), ".").ok(),
                            "env": run.context_for_step(index).env,
                        })
                    })
                    .collect();
                serde_json::json!({
                    "job": run.job_id,
                    "variant": run.variant.values,
                    "steps": steps,
                })
            })
            .collect();
        let data = serde_json::json!({
            "workflow": workflow.name,
            "event": event.kind.as_str(),
            "branch": event.branch,
            "runs": data,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(true);
    }

    if !workflow.is_triggered_by(&event) {
        println!(
            "{} {} on '{}' does not trigger {}",
            WARN,
            event.kind,
            event.branch,
            style(&workflow.name).bold()
        );
        return Ok(true);
    }

    println!(
        "{} {} on '{}' starts {} run instance(s) of {}",
        INFO,
        event.kind,
        event.branch,
        style(runs.len()).cyan(),
        style(&workflow.name).bold()
    );
    for run in &runs {
        println!("\n  {}", style(run.display_name()).bold());
        for (index, step) in run.steps.iter().enumerate() {
            let context = run.context_for_step(index);
            let script = match &step.action {
                StepAction::Uses { uses, .. } => format!("uses {}", uses),
                StepAction::Run { .. } => step
                    .render_script(&context, ".")
                    .unwrap_or_else(|e| format!("<{}>", e)),
            };
            println!(
                "    {}. {} [{}] {}",
                index + 1,
                style(&step.name).cyan(),
                step.kind,
                style(script).dim()
            );
        }
    }

    Ok(true)
}

fn validate_workflow(cmd: &ValidateCommand) -> Result<bool> {
    println!("{} Validating workflow...", INFO);

    let result = WorkflowConfig::from_file(&cmd.file).and_then(|config| {
        let workflow = config.to_workflow()?;
        Ok((config, workflow))
    });

    match result {
        Ok((config, workflow)) => {
            println!("{} Workflow configuration is valid!", CHECK);
            println!("  Name: {}", style(&workflow.name).bold());
            let triggers: Vec<&str> = workflow.triggers.kinds().map(|k| k.as_str()).collect();
            println!("  Triggers: {}", style(triggers.join(", ")).cyan());
            for job in &workflow.jobs {
                println!(
                    "  Job {}: {} step(s), {} variant(s)",
                    style(&job.id).bold(),
                    style(job.steps.len()).cyan(),
                    style(job.matrix.expand().len()).cyan()
                );
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(true)
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            Ok(false)
        }
    }
}

async fn show_history(cmd: &HistoryCommand) -> Result<bool> {
    let store = SqliteExecutionStore::with_default_path().await?;

    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run ID format")?;
        match store.load_run(run_id).await? {
            Some(record) => print_run_details(&record, cmd.json)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(true);
    }

    let mut records = if let Some(workflow) = &cmd.workflow {
        store.list_runs(workflow).await?
    } else {
        let mut all = Vec::new();
        for workflow in store.list_workflows().await? {
            all.extend(store.list_runs(&workflow).await?);
        }
        all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all
    };
    records.truncate(cmd.limit);

    if cmd.json {
        let data = serde_json::json!({ "runs": records });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(true);
    }

    if records.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(true);
    }

    println!("{} Run history (showing latest {}):", INFO, records.len());
    for record in &records {
        println!("  {}", format_run_record(record));
    }

    Ok(true)
}

fn print_run_details(record: &RunRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }

    println!("{} Run Details", INFO);
    println!("  ID: {}", style(record.run_id).cyan());
    println!("  Workflow: {}", style(&record.workflow_name).bold());
    println!("  Job: {} [{}]", record.job_id, style(&record.variant).cyan());
    println!("  Event: {} on {}", record.event, record.branch);
    println!("  Status: {}", format_status(record.status));
    if let (Some(kind), Some(step)) = (record.failure_kind, &record.failed_step) {
        println!("  Failure: {} in step {}", kind, style(step).red());
    }
    println!("  Started: {}", style(record.started_at.to_rfc3339()).dim());
    if let Some(completed) = record.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(record.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Progress: {} ({}/{})",
        style(format!("{:.0}%", record.progress() * 100.0)).cyan(),
        record.completed_steps,
        record.total_steps
    );

    Ok(())
}

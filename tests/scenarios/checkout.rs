//! Scenario: checkout clones a local repository into each run workspace

use cirun::core::{RunStatus, TriggerEvent};
use cirun::execution::{ExecutionEngine, RunOptions, SchedulingStrategy, ShellRunner, WorkflowScheduler};
use std::path::{Component, Path, PathBuf};
use std::process::Command;

use crate::helpers::{completed, run_for, workflow_from_yaml};

const WORKFLOW: &str = r#"
name: "Checkout"
on:
  push:
    branches: [main]
jobs:
  build:
    strategy:
      matrix:
        toolchain: [stable, nightly]
    steps:
      - uses: actions/checkout@v4
      - name: Build
        run: test "$(cat Cargo.toml)" = "[package]"
"#;

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(["-c", "user.name=cirun", "-c", "user.email=cirun@localhost"])
        .args(args)
        .current_dir(dir)
        .status()
        .expect("git should be installed");
    assert!(status.success(), "git {:?} failed", args);
}

/// A throwaway repository with a single commit
fn source_repository() -> tempfile::TempDir {
    let repo = tempfile::tempdir().unwrap();
    git(repo.path(), &["init", "-q"]);
    std::fs::write(repo.path().join("Cargo.toml"), "[package]\n").unwrap();
    git(repo.path(), &["add", "Cargo.toml"]);
    git(repo.path(), &["commit", "-q", "-m", "init"]);
    repo
}

/// `target` spelled relative to the current directory
fn relative_to_cwd(target: &Path) -> String {
    let cwd = std::env::current_dir().unwrap().canonicalize().unwrap();
    let target = target.canonicalize().unwrap();

    let mut relative = PathBuf::new();
    for component in cwd.components() {
        if let Component::Normal(_) = component {
            relative.push("..");
        }
    }
    for component in target.components() {
        if let Component::Normal(part) = component {
            relative.push(part);
        }
    }
    relative.to_string_lossy().into_owned()
}

async fn checkout_from(repository: String) {
    let root = tempfile::tempdir().unwrap();
    let scheduler = WorkflowScheduler::new(ExecutionEngine::new(ShellRunner::new()), SchedulingStrategy::Parallel);

    let outcome = completed(
        scheduler
            .dispatch(
                &workflow_from_yaml(WORKFLOW),
                &TriggerEvent::push("main"),
                &RunOptions::new(repository, root.path()),
            )
            .await
            .unwrap(),
    );

    for toolchain in ["stable", "nightly"] {
        let run = run_for(&outcome, toolchain);
        assert_eq!(run.state.status, RunStatus::Succeeded, "{:?}", run.state.failure);
        assert_eq!(run.executed_steps(), vec!["checkout", "build"]);
    }
}

#[tokio::test]
async fn test_checkout_from_absolute_path() {
    let repo = source_repository();
    checkout_from(repo.path().to_string_lossy().into_owned()).await;
}

#[tokio::test]
async fn test_checkout_from_relative_path() {
    let repo = source_repository();
    let relative = relative_to_cwd(repo.path());
    assert!(Path::new(&relative).is_relative());
    checkout_from(relative).await;
}

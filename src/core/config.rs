//! Workflow configuration from YAML

use crate::core::{
    context::referenced_names,
    matrix::Matrix,
    step::{BuiltinAction, Shell, Step, StepAction, StepDefaults, StepKind},
    trigger::{BranchPattern, EventFilter, EventKind, TriggerSet},
    workflow::{Job, Workflow},
};
use crate::core::state::StepState;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Top-level workflow configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Workflow name (defaults to the file stem when loaded from a file)
    #[serde(default)]
    pub name: Option<String>,

    /// Events that trigger the workflow
    #[serde(rename = "on")]
    pub on: OnConfig,

    /// Environment for every job and step
    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    /// Jobs keyed by job ID
    pub jobs: BTreeMap<String, JobConfig>,
}

/// The `on:` section: a single event, a list of events, or a map with filters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OnConfig {
    Single(String),
    List(Vec<String>),
    Map(BTreeMap<String, Option<EventFilterConfig>>),
}

/// Branch filters for one event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilterConfig {
    #[serde(default)]
    pub branches: Vec<String>,

    #[serde(default, rename = "branches-ignore")]
    pub branches_ignore: Vec<String>,
}

/// Job configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Display name
    #[serde(default)]
    pub name: Option<String>,

    /// Runner label(s)
    #[serde(default, rename = "runs-on")]
    pub runs_on: Option<Value>,

    /// Job-level environment
    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    /// Default step timeout for this job
    #[serde(default, rename = "timeout-minutes")]
    pub timeout_minutes: Option<u64>,

    /// Matrix strategy
    #[serde(default)]
    pub strategy: Option<StrategyConfig>,

    /// Steps in execution order
    pub steps: Vec<StepConfig>,
}

/// `strategy:` section of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default)]
    pub matrix: Option<MatrixConfig>,

    #[serde(default, rename = "max-parallel")]
    pub max_parallel: Option<usize>,
}

/// `strategy.matrix:` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixConfig {
    /// Combinations to drop
    #[serde(default)]
    pub exclude: Vec<BTreeMap<String, Value>>,

    /// Axis name -> values
    #[serde(flatten)]
    pub axes: BTreeMap<String, Vec<Value>>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    /// Shell script to run
    #[serde(default)]
    pub run: Option<String>,

    /// Shell for `run` (sh or bash)
    #[serde(default)]
    pub shell: Option<String>,

    /// Built-in action reference
    #[serde(default)]
    pub uses: Option<String>,

    /// Action inputs
    #[serde(default)]
    pub with: BTreeMap<String, Value>,

    /// Step-level environment
    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    #[serde(default, rename = "timeout-minutes")]
    pub timeout_minutes: Option<u64>,

    #[serde(default, rename = "working-directory")]
    pub working_directory: Option<String>,
}

/// Render a YAML scalar as a string (`None` for sequences and mappings)
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

fn scalar_map(map: &BTreeMap<String, Value>, what: &str) -> Result<BTreeMap<String, String>> {
    map.iter()
        .map(|(key, value)| {
            scalar_to_string(value)
                .map(|v| (key.clone(), v))
                .ok_or_else(|| anyhow::anyhow!("{} '{}' must be a scalar value", what, key))
        })
        .collect()
}

fn parse_patterns(patterns: &[String], event: &str) -> Result<Vec<BranchPattern>> {
    patterns
        .iter()
        .map(|p| {
            BranchPattern::parse(p)
                .with_context(|| format!("Invalid branch pattern '{}' for event '{}'", p, event))
        })
        .collect()
}

fn slugify(text: &str) -> String {
    let slug: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    slug.split('-').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("-")
}

impl OnConfig {
    /// Build the trigger set
    pub fn to_triggers(&self) -> Result<TriggerSet> {
        let mut triggers = TriggerSet::new();

        let entries: Vec<(&str, Option<&EventFilterConfig>)> = match self {
            OnConfig::Single(name) => vec![(name.as_str(), None)],
            OnConfig::List(names) => names.iter().map(|n| (n.as_str(), None)).collect(),
            OnConfig::Map(map) => map.iter().map(|(n, f)| (n.as_str(), f.as_ref())).collect(),
        };

        if entries.is_empty() {
            anyhow::bail!("Workflow must declare at least one trigger event");
        }

        for (name, filter) in entries {
            let kind = EventKind::parse(name)
                .ok_or_else(|| anyhow::anyhow!("Unsupported trigger event '{}'", name))?;

            let filter = match filter {
                None => EventFilter::default(),
                Some(f) => {
                    if !f.branches.is_empty() && !f.branches_ignore.is_empty() {
                        anyhow::bail!(
                            "Event '{}' cannot use both 'branches' and 'branches-ignore'",
                            name
                        );
                    }
                    EventFilter {
                        branches: parse_patterns(&f.branches, name)?,
                        branches_ignore: parse_patterns(&f.branches_ignore, name)?,
                    }
                }
            };
            triggers.insert(kind, filter);
        }

        Ok(triggers)
    }
}

impl MatrixConfig {
    /// Build the matrix model
    pub fn to_matrix(&self) -> Result<Matrix> {
        let mut matrix = Matrix::default();

        for (axis, values) in &self.axes {
            if axis == "include" {
                anyhow::bail!("Matrix 'include' is not supported");
            }
            if values.is_empty() {
                anyhow::bail!("Matrix axis '{}' has no values", axis);
            }
            let values = values
                .iter()
                .map(|v| {
                    scalar_to_string(v)
                        .ok_or_else(|| anyhow::anyhow!("Matrix axis '{}' values must be scalars", axis))
                })
                .collect::<Result<Vec<_>>>()?;
            matrix.axes.insert(axis.clone(), values);
        }

        for rule in &self.exclude {
            let rule = scalar_map(rule, "Matrix exclude key")?;
            for axis in rule.keys() {
                if !matrix.axes.contains_key(axis) {
                    anyhow::bail!("Matrix exclude references unknown axis '{}'", axis);
                }
            }
            matrix.exclude.push(rule);
        }

        if matrix.expand().is_empty() {
            anyhow::bail!("Matrix exclude removes every combination");
        }

        Ok(matrix)
    }
}

fn minutes_to_secs(minutes: u64) -> Result<u64> {
    minutes
        .checked_mul(60)
        .ok_or_else(|| anyhow::anyhow!("timeout-minutes {} is too large", minutes))
}

impl StepConfig {
    /// Default identifier for a step without an explicit `id`
    fn fallback_id(&self, index: usize) -> String {
        let from_name = self.name.as_deref().map(slugify).filter(|s| !s.is_empty());
        let from_uses = self.uses.as_deref().and_then(|u| {
            let name = u.split('@').next().unwrap_or(u);
            name.rsplit('/').next().map(slugify)
        });
        from_name
            .or(from_uses)
            .unwrap_or_else(|| format!("step-{}", index + 1))
    }

    /// Default display name, following the `Run <command>` convention
    fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if let Some(uses) = &self.uses {
            return format!("Run {}", uses);
        }
        let first_line = self.run.as_deref().unwrap_or_default().lines().next().unwrap_or_default();
        format!("Run {}", first_line.trim())
    }

    fn to_step(&self, id: String, timeout_secs: u64) -> Result<Step> {
        let action = match (&self.run, &self.uses) {
            (Some(script), None) => {
                let shell = match &self.shell {
                    None => Shell::Sh,
                    Some(name) => Shell::parse(name)
                        .ok_or_else(|| anyhow::anyhow!("Step '{}' uses unsupported shell '{}'", id, name))?,
                };
                StepAction::Run {
                    script: script.clone(),
                    shell,
                }
            }
            (None, Some(uses)) => {
                let action = BuiltinAction::resolve(uses)
                    .ok_or_else(|| anyhow::anyhow!("Step '{}' uses unsupported action '{}'", id, uses))?;
                StepAction::Uses {
                    uses: uses.clone(),
                    action,
                    with: scalar_map(&self.with, "Step input")?,
                }
            }
            (Some(_), Some(_)) => anyhow::bail!("Step '{}' cannot have both 'run' and 'uses'", id),
            (None, None) => anyhow::bail!("Step '{}' must have either 'run' or 'uses'", id),
        };

        let timeout_secs = match self.timeout_minutes {
            Some(minutes) => {
                minutes_to_secs(minutes).with_context(|| format!("Invalid timeout in step '{}'", id))?
            }
            None => timeout_secs,
        };

        let kind = match &action {
            StepAction::Run { script, .. } => StepKind::infer_from_script(script),
            StepAction::Uses { action, .. } => action.kind(),
        };

        Ok(Step {
            id,
            name: self.display_name(),
            action,
            env: scalar_map(&self.env, "Environment variable")?,
            kind,
            timeout_secs,
            working_directory: self.working_directory.clone(),
            state: StepState::Pending,
        })
    }
}

impl JobConfig {
    fn to_job(&self, id: &str) -> Result<Job> {
        if self.steps.is_empty() {
            anyhow::bail!("Job '{}' has no steps", id);
        }

        let matrix = match self.strategy.as_ref().and_then(|s| s.matrix.as_ref()) {
            Some(m) => m.to_matrix().with_context(|| format!("Invalid matrix in job '{}'", id))?,
            None => Matrix::default(),
        };

        let max_parallel = self.strategy.as_ref().and_then(|s| s.max_parallel);
        if max_parallel == Some(0) {
            anyhow::bail!("Job '{}' has max-parallel of 0", id);
        }

        let defaults = StepDefaults {
            timeout_secs: match self.timeout_minutes {
                Some(minutes) => {
                    minutes_to_secs(minutes).with_context(|| format!("Invalid timeout in job '{}'", id))?
                }
                None => StepDefaults::default().timeout_secs,
            },
        };

        // Explicit IDs must be unique; generated IDs are deduplicated.
        let mut explicit = HashSet::new();
        for step in &self.steps {
            if let Some(step_id) = &step.id {
                if !explicit.insert(step_id.clone()) {
                    anyhow::bail!("Duplicate step ID '{}' in job '{}'", step_id, id);
                }
            }
        }

        let mut used: HashSet<String> = explicit.clone();
        let mut steps = Vec::with_capacity(self.steps.len());
        for (index, step_config) in self.steps.iter().enumerate() {
            let step_id = match &step_config.id {
                Some(explicit_id) => explicit_id.clone(),
                None => {
                    let base = step_config.fallback_id(index);
                    let mut candidate = base.clone();
                    let mut n = 2;
                    while used.contains(&candidate) {
                        candidate = format!("{}-{}", base, n);
                        n += 1;
                    }
                    used.insert(candidate.clone());
                    candidate
                }
            };

            let step = step_config
                .to_step(step_id, defaults.timeout_secs)
                .with_context(|| format!("Invalid step in job '{}'", id))?;

            for template in step.templates() {
                for name in referenced_names(template) {
                    if let Some(axis) = name.strip_prefix("matrix.") {
                        if !matrix.axes.contains_key(axis) {
                            anyhow::bail!(
                                "Step '{}' in job '{}' references unknown matrix axis '{}'",
                                step.id,
                                id,
                                axis
                            );
                        }
                    }
                }
            }

            steps.push(step);
        }

        Ok(Job {
            id: id.to_string(),
            name: self.name.clone().unwrap_or_else(|| id.to_string()),
            runs_on: self.runs_on.as_ref().and_then(|v| match v {
                Value::Sequence(labels) => Some(
                    labels.iter().filter_map(scalar_to_string).collect::<Vec<_>>().join(","),
                ),
                other => scalar_to_string(other),
            }),
            env: scalar_map(&self.env, "Environment variable")?,
            matrix,
            max_parallel,
            steps,
        })
    }
}

impl WorkflowConfig {
    /// Load workflow configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow file {}", path.display()))?;
        let mut config = Self::from_yaml(&content)?;
        if config.name.is_none() {
            config.name = path.file_stem().map(|s| s.to_string_lossy().into_owned());
        }
        Ok(config)
    }

    /// Parse workflow configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WorkflowConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the workflow configuration
    pub fn validate(&self) -> Result<()> {
        self.to_workflow().map(|_| ())
    }

    /// Workflow name, falling back to `workflow`
    pub fn workflow_name(&self) -> &str {
        self.name.as_deref().unwrap_or("workflow")
    }

    /// Convert config to a Workflow domain model
    pub fn to_workflow(&self) -> Result<Workflow> {
        if self.jobs.is_empty() {
            anyhow::bail!("Workflow must define at least one job");
        }

        let triggers = self.on.to_triggers()?;
        let jobs = self
            .jobs
            .iter()
            .map(|(id, job)| job.to_job(id))
            .collect::<Result<Vec<_>>>()?;

        Ok(Workflow {
            name: self.workflow_name().to_string(),
            triggers,
            env: scalar_map(&self.env, "Environment variable")?,
            jobs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::trigger::TriggerEvent;

    const CHECKED_IN: &str = include_str!("../../.github/workflows/ci.yml");

    #[test]
    fn test_checked_in_workflow_triggers() {
        let workflow = WorkflowConfig::from_yaml(CHECKED_IN).unwrap().to_workflow().unwrap();

        assert!(workflow.is_triggered_by(&TriggerEvent::push("main")));
        assert!(workflow.is_triggered_by(&TriggerEvent::pull_request("main")));
        assert!(!workflow.is_triggered_by(&TriggerEvent::push("feature/x")));
        assert!(!workflow.is_triggered_by(&TriggerEvent::pull_request("develop")));
    }

    #[test]
    fn test_checked_in_workflow_shape() {
        let workflow = WorkflowConfig::from_yaml(CHECKED_IN).unwrap().to_workflow().unwrap();

        assert_eq!(workflow.env.get("CARGO_TERM_COLOR"), Some(&"always".to_string()));
        assert_eq!(workflow.jobs.len(), 1);

        let job = &workflow.jobs[0];
        assert_eq!(
            job.matrix.axes.get("toolchain"),
            Some(&vec!["stable".to_string(), "nightly".to_string()])
        );

        let kinds: Vec<StepKind> = job.steps.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![StepKind::Toolchain, StepKind::Checkout, StepKind::Build, StepKind::Test]
        );
        assert!(job.steps.iter().skip(2).all(|s| matches!(
            &s.action,
            StepAction::Run { script, .. } if script.contains("--verbose")
        )));
    }

    #[test]
    fn test_on_forms() {
        let single = r#"
on: push
jobs:
  a:
    steps:
      - run: echo hi
"#;
        let workflow = WorkflowConfig::from_yaml(single).unwrap().to_workflow().unwrap();
        assert!(workflow.is_triggered_by(&TriggerEvent::push("anything")));
        assert!(!workflow.is_triggered_by(&TriggerEvent::pull_request("main")));

        let list = r#"
on: [push, pull_request]
jobs:
  a:
    steps:
      - run: echo hi
"#;
        let workflow = WorkflowConfig::from_yaml(list).unwrap().to_workflow().unwrap();
        assert!(workflow.is_triggered_by(&TriggerEvent::pull_request("develop")));

        let bare_key = r#"
on:
  push:
jobs:
  a:
    steps:
      - run: echo hi
"#;
        let workflow = WorkflowConfig::from_yaml(bare_key).unwrap().to_workflow().unwrap();
        assert!(workflow.is_triggered_by(&TriggerEvent::push("main")));
    }

    #[test]
    fn test_unknown_event_fails() {
        let yaml = r#"
on: schedule
jobs:
  a:
    steps:
      - run: echo hi
"#;
        let err = WorkflowConfig::from_yaml(yaml).unwrap_err().to_string();
        assert!(err.contains("schedule"));
    }

    #[test]
    fn test_branches_and_ignore_together_fail() {
        let yaml = r#"
on:
  push:
    branches: [main]
    branches-ignore: [dev]
jobs:
  a:
    steps:
      - run: echo hi
"#;
        assert!(WorkflowConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_no_jobs_fails() {
        let yaml = r#"
on: push
jobs: {}
"#;
        assert!(WorkflowConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_step_needs_exactly_one_of_run_and_uses() {
        let neither = r#"
on: push
jobs:
  a:
    steps:
      - name: "Nothing"
"#;
        assert!(WorkflowConfig::from_yaml(neither).is_err());

        let both = r#"
on: push
jobs:
  a:
    steps:
      - run: echo hi
        uses: actions/checkout@v4
"#;
        assert!(WorkflowConfig::from_yaml(both).is_err());
    }

    #[test]
    fn test_duplicate_step_id_fails() {
        let yaml = r#"
on: push
jobs:
  a:
    steps:
      - id: build
        run: cargo build
      - id: build
        run: cargo build --release
"#;
        let err = format!("{:#}", WorkflowConfig::from_yaml(yaml).unwrap_err());
        assert!(err.contains("Duplicate step ID 'build'"));
    }

    #[test]
    fn test_generated_step_ids_are_unique() {
        let yaml = r#"
on: push
jobs:
  a:
    steps:
      - uses: actions/checkout@v4
      - name: Build
        run: cargo build
      - name: Build
        run: cargo build --release
      - run: echo done
"#;
        let workflow = WorkflowConfig::from_yaml(yaml).unwrap().to_workflow().unwrap();
        let ids: Vec<&str> = workflow.jobs[0].steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["checkout", "build", "build-2", "step-4"]);
        assert_eq!(workflow.jobs[0].steps[0].name, "Run actions/checkout@v4");
        assert_eq!(workflow.jobs[0].steps[3].name, "Run echo done");
    }

    #[test]
    fn test_unknown_matrix_axis_reference_fails() {
        let yaml = r#"
on: push
jobs:
  a:
    strategy:
      matrix:
        toolchain: [stable]
    steps:
      - run: echo ${{ matrix.os }}
"#;
        let err = format!("{:#}", WorkflowConfig::from_yaml(yaml).unwrap_err());
        assert!(err.contains("unknown matrix axis 'os'"));
    }

    #[test]
    fn test_unsupported_action_fails() {
        let yaml = r#"
on: push
jobs:
  a:
    steps:
      - uses: actions/cache@v4
"#;
        let err = format!("{:#}", WorkflowConfig::from_yaml(yaml).unwrap_err());
        assert!(err.contains("actions/cache@v4"));
    }

    #[test]
    fn test_matrix_scalars_and_exclude() {
        let yaml = r#"
on: push
jobs:
  a:
    strategy:
      max-parallel: 1
      matrix:
        toolchain: [stable, 1.70]
        features: [true, false]
        exclude:
          - toolchain: 1.70
            features: true
    steps:
      - run: cargo +${{ matrix.toolchain }} build
"#;
        let workflow = WorkflowConfig::from_yaml(yaml).unwrap().to_workflow().unwrap();
        let job = &workflow.jobs[0];
        assert_eq!(job.max_parallel, Some(1));
        assert_eq!(job.matrix.expand().len(), 3);
    }

    #[test]
    fn test_exclude_unknown_axis_fails() {
        let yaml = r#"
on: push
jobs:
  a:
    strategy:
      matrix:
        toolchain: [stable]
        exclude:
          - os: windows
    steps:
      - run: echo hi
"#;
        assert!(WorkflowConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_timeouts() {
        let yaml = r#"
on: push
jobs:
  a:
    timeout-minutes: 10
    steps:
      - run: echo one
      - run: echo two
        timeout-minutes: 1
"#;
        let workflow = WorkflowConfig::from_yaml(yaml).unwrap().to_workflow().unwrap();
        let steps = &workflow.jobs[0].steps;
        assert_eq!(steps[0].timeout_secs, 600);
        assert_eq!(steps[1].timeout_secs, 60);
    }

    #[test]
    fn test_oversized_timeout_fails() {
        let job_level = r#"
on: push
jobs:
  a:
    timeout-minutes: 18446744073709551615
    steps:
      - run: echo one
"#;
        let err = format!("{:#}", WorkflowConfig::from_yaml(job_level).unwrap_err());
        assert!(err.contains("too large"));

        let step_level = r#"
on: push
jobs:
  a:
    steps:
      - run: echo one
        timeout-minutes: 307445734561825861
"#;
        let err = format!("{:#}", WorkflowConfig::from_yaml(step_level).unwrap_err());
        assert!(err.contains("too large"));
    }

    #[test]
    fn test_matrix_excluding_every_combination_fails() {
        let yaml = r#"
on: push
jobs:
  a:
    strategy:
      matrix:
        toolchain: [stable]
        exclude:
          - toolchain: stable
    steps:
      - run: echo hi
"#;
        let err = format!("{:#}", WorkflowConfig::from_yaml(yaml).unwrap_err());
        assert!(err.contains("removes every combination"));
    }

    #[test]
    fn test_from_file_defaults_name_to_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nightly-check.yml");
        std::fs::write(&path, "on: push\njobs:\n  a:\n    steps:\n      - run: echo hi\n").unwrap();

        let config = WorkflowConfig::from_file(&path).unwrap();
        assert_eq!(config.workflow_name(), "nightly-check");
    }
}

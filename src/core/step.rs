//! Step domain model

use crate::core::{context::RunContext, state::StepState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What a step does, as far as the run state machine is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Provisions a compiler toolchain
    Toolchain,
    /// Materializes repository content
    Checkout,
    /// Builds the project
    Build,
    /// Runs the project's tests
    Test,
    /// Any other command
    Command,
}

impl StepKind {
    /// Infer the kind of a `run:` script
    pub fn infer_from_script(script: &str) -> Self {
        if script.contains("rustup toolchain install") || script.contains("rustup update") {
            StepKind::Toolchain
        } else if script.contains("cargo build") {
            StepKind::Build
        } else if script.contains("cargo test") {
            StepKind::Test
        } else {
            StepKind::Command
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepKind::Toolchain => "toolchain",
            StepKind::Checkout => "checkout",
            StepKind::Build => "build",
            StepKind::Test => "test",
            StepKind::Command => "command",
        };
        f.write_str(name)
    }
}

/// Shell used for `run:` steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shell {
    Sh,
    Bash,
}

impl Shell {
    /// Parse a `shell:` value
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "sh" => Some(Shell::Sh),
            "bash" => Some(Shell::Bash),
            _ => None,
        }
    }

    /// Program and leading arguments; the script is appended last
    pub fn command(&self) -> (&'static str, [&'static str; 2]) {
        match self {
            Shell::Sh => ("sh", ["-e", "-c"]),
            Shell::Bash => ("bash", ["-e", "-c"]),
        }
    }
}

/// Actions the runner implements natively for `uses:` steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuiltinAction {
    /// `actions/checkout`
    Checkout,
    /// `dtolnay/rust-toolchain` or `actions-rs/toolchain`; carries the
    /// channel named by the `@ref`, if any
    RustToolchain { ref_channel: Option<String> },
}

const CHANNELS: [&str; 3] = ["stable", "beta", "nightly"];

impl BuiltinAction {
    /// Resolve a `uses:` reference such as `actions/checkout@v4`
    pub fn resolve(uses: &str) -> Option<Self> {
        let (name, git_ref) = match uses.split_once('@') {
            Some((name, git_ref)) => (name, Some(git_ref)),
            None => (uses, None),
        };

        match name {
            "actions/checkout" => Some(BuiltinAction::Checkout),
            "dtolnay/rust-toolchain" | "actions-rs/toolchain" => {
                let ref_channel = git_ref
                    .filter(|r| CHANNELS.contains(r) || r.chars().next().is_some_and(|c| c.is_ascii_digit()))
                    .map(str::to_string);
                Some(BuiltinAction::RustToolchain { ref_channel })
            }
            _ => None,
        }
    }

    /// Step kind this action represents
    pub fn kind(&self) -> StepKind {
        match self {
            BuiltinAction::Checkout => StepKind::Checkout,
            BuiltinAction::RustToolchain { .. } => StepKind::Toolchain,
        }
    }

    /// Shell script implementing this action
    pub fn script(
        &self,
        with: &BTreeMap<String, String>,
        repository: &str,
    ) -> Result<String, String> {
        match self {
            BuiltinAction::Checkout => {
                let branch = with
                    .get("ref")
                    .filter(|r| !r.is_empty())
                    .map(|r| format!(" --branch {}", shell_quote(r)))
                    .unwrap_or_default();
                Ok(format!("git clone --quiet{} {} .", branch, shell_quote(repository)))
            }
            BuiltinAction::RustToolchain { ref_channel } => {
                let channel = with
                    .get("toolchain")
                    .filter(|t| !t.is_empty())
                    .or(ref_channel.as_ref())
                    .ok_or_else(|| "no toolchain given in `with.toolchain` or action ref".to_string())?;
                let channel = shell_quote(channel);
                Ok(format!(
                    "rustup toolchain install {channel} --profile minimal && rustup override set {channel}"
                ))
            }
        }
    }
}

/// Quote a value for `sh` when it contains anything beyond safe characters
pub fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:@+=,".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

/// How a step is carried out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepAction {
    /// Shell script template
    Run { script: String, shell: Shell },
    /// Built-in action with its `with:` inputs (templates)
    Uses {
        uses: String,
        action: BuiltinAction,
        with: BTreeMap<String, String>,
    },
}

/// A single step in a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Step identifier, unique within its job
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// What the step runs
    pub action: StepAction,

    /// Step-level environment (templates)
    pub env: BTreeMap<String, String>,

    /// Inferred step kind
    pub kind: StepKind,

    /// Timeout in seconds
    pub timeout_secs: u64,

    /// Optional working directory relative to the instance workspace
    pub working_directory: Option<String>,

    /// Runtime state
    pub state: StepState,
}

impl Step {
    /// Create a `run:` step
    pub fn run(id: &str, name: &str, script: &str) -> Self {
        Step {
            id: id.to_string(),
            name: name.to_string(),
            action: StepAction::Run {
                script: script.to_string(),
                shell: Shell::Sh,
            },
            env: BTreeMap::new(),
            kind: StepKind::infer_from_script(script),
            timeout_secs: StepDefaults::default().timeout_secs,
            working_directory: None,
            state: StepState::Pending,
        }
    }

    /// Create a `uses:` step, or `None` when the action is not built in
    pub fn uses(id: &str, name: &str, uses: &str, with: BTreeMap<String, String>) -> Option<Self> {
        let action = BuiltinAction::resolve(uses)?;
        Some(Step {
            id: id.to_string(),
            name: name.to_string(),
            kind: action.kind(),
            action: StepAction::Uses {
                uses: uses.to_string(),
                action,
                with,
            },
            env: BTreeMap::new(),
            timeout_secs: StepDefaults::default().timeout_secs,
            working_directory: None,
            state: StepState::Pending,
        })
    }

    /// Templates this step renders, for expression validation
    pub fn templates(&self) -> Vec<&str> {
        let mut templates: Vec<&str> = self.env.values().map(String::as_str).collect();
        match &self.action {
            StepAction::Run { script, .. } => templates.push(script),
            StepAction::Uses { with, .. } => templates.extend(with.values().map(String::as_str)),
        }
        templates
    }

    /// Render the script this step executes
    pub fn render_script(&self, context: &RunContext, repository: &str) -> Result<String, String> {
        match &self.action {
            StepAction::Run { script, .. } => Ok(context.render(script)),
            StepAction::Uses { action, with, .. } => {
                let rendered: BTreeMap<String, String> = with
                    .iter()
                    .map(|(k, v)| (k.clone(), context.render(v)))
                    .collect();
                action.script(&rendered, repository)
            }
        }
    }

    /// Shell the rendered script runs under
    pub fn shell(&self) -> Shell {
        match &self.action {
            StepAction::Run { shell, .. } => *shell,
            StepAction::Uses { .. } => Shell::Sh,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepDefaults {
    pub timeout_secs: u64,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            timeout_secs: 360 * 60, // 6 hours
        }
    }
}

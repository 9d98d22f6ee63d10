//! Trigger model - which events start a workflow

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of repository event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Commits pushed to a branch
    Push,
    /// Pull request opened or updated against a base branch
    PullRequest,
}

impl EventKind {
    /// Name used in workflow files
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Push => "push",
            EventKind::PullRequest => "pull_request",
        }
    }

    /// Parse a workflow event name
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "push" => Some(EventKind::Push),
            "pull_request" => Some(EventKind::PullRequest),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An incoming event to evaluate against workflow triggers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Event kind
    pub kind: EventKind,

    /// Branch the event targets: the pushed branch for `push`,
    /// the base branch for `pull_request`
    pub branch: String,
}

impl TriggerEvent {
    /// Create an event, normalizing `refs/heads/` prefixes
    pub fn new(kind: EventKind, branch: impl Into<String>) -> Self {
        let branch = branch.into();
        let branch = branch
            .strip_prefix("refs/heads/")
            .map(str::to_string)
            .unwrap_or(branch);
        Self { kind, branch }
    }

    /// A push to `branch`
    pub fn push(branch: impl Into<String>) -> Self {
        Self::new(EventKind::Push, branch)
    }

    /// A pull request targeting `base`
    pub fn pull_request(base: impl Into<String>) -> Self {
        Self::new(EventKind::PullRequest, base)
    }

    /// Fully-qualified ref of the target branch
    pub fn git_ref(&self) -> String {
        format!("refs/heads/{}", self.branch)
    }
}

/// Branch name pattern (not serializable due to Regex)
#[derive(Debug, Clone)]
pub enum BranchPattern {
    /// Literal branch name
    Exact(String),
    /// Glob compiled to a regular expression
    Glob { source: String, regex: Regex },
}

impl BranchPattern {
    /// Parse a branch pattern. `*` matches within one path segment,
    /// `**` matches across segments, `?` matches one character.
    pub fn parse(pattern: &str) -> Result<Self, regex::Error> {
        if !pattern.contains(['*', '?']) {
            return Ok(BranchPattern::Exact(pattern.to_string()));
        }

        let mut expr = String::from("^");
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' if chars.peek() == Some(&'*') => {
                    chars.next();
                    expr.push_str(".*");
                }
                '*' => expr.push_str("[^/]*"),
                '?' => expr.push_str("[^/]"),
                other => expr.push_str(&regex::escape(&other.to_string())),
            }
        }
        expr.push('$');

        Ok(BranchPattern::Glob {
            source: pattern.to_string(),
            regex: Regex::new(&expr)?,
        })
    }

    /// Check if the pattern matches the given branch
    pub fn matches(&self, branch: &str) -> bool {
        match self {
            BranchPattern::Exact(name) => name == branch,
            BranchPattern::Glob { regex, .. } => regex.is_match(branch),
        }
    }

    /// The pattern as written in the workflow
    pub fn as_str(&self) -> &str {
        match self {
            BranchPattern::Exact(name) => name,
            BranchPattern::Glob { source, .. } => source,
        }
    }
}

/// Branch filter attached to one event kind
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Branches to include (empty = all)
    pub branches: Vec<BranchPattern>,

    /// Branches to exclude
    pub branches_ignore: Vec<BranchPattern>,
}

impl EventFilter {
    /// Check whether a branch passes this filter
    pub fn allows(&self, branch: &str) -> bool {
        if self.branches_ignore.iter().any(|p| p.matches(branch)) {
            return false;
        }
        self.branches.is_empty() || self.branches.iter().any(|p| p.matches(branch))
    }
}

/// The set of events a workflow reacts to
#[derive(Debug, Clone, Default)]
pub struct TriggerSet {
    filters: BTreeMap<EventKind, EventFilter>,
}

impl TriggerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an event kind with its filter
    pub fn insert(&mut self, kind: EventKind, filter: EventFilter) {
        self.filters.insert(kind, filter);
    }

    /// Builder form of [`TriggerSet::insert`]
    pub fn with(mut self, kind: EventKind, filter: EventFilter) -> Self {
        self.insert(kind, filter);
        self
    }

    /// Event kinds this set reacts to
    pub fn kinds(&self) -> impl Iterator<Item = EventKind> + '_ {
        self.filters.keys().copied()
    }

    /// Check if an event starts the workflow
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        self.filters
            .get(&event.kind)
            .is_some_and(|filter| filter.allows(&event.branch))
    }
}

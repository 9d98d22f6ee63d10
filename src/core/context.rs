//! Run context - values available to `${{ ... }}` expressions

use crate::core::{matrix::MatrixVariant, trigger::TriggerEvent};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn expression_regex() -> &'static Regex {
    static EXPRESSION: OnceLock<Regex> = OnceLock::new();
    EXPRESSION.get_or_init(|| {
        Regex::new(r"\$\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("expression regex is valid")
    })
}

/// Names referenced by `${{ ... }}` expressions in a template
pub fn referenced_names(template: &str) -> Vec<String> {
    expression_regex()
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Execution context for a run instance
///
/// Holds the matrix values, resolved environment and event information that
/// step scripts and `with` inputs are rendered against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunContext {
    /// Matrix values of the variant being run
    pub matrix: BTreeMap<String, String>,

    /// Environment visible to expressions (`env.NAME`)
    pub env: BTreeMap<String, String>,

    /// `github.*` values
    pub github: BTreeMap<String, String>,
}

impl RunContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the context for a variant triggered by `event`
    pub fn for_variant(variant: &MatrixVariant, event: &TriggerEvent) -> Self {
        let mut github = BTreeMap::new();
        github.insert("event_name".to_string(), event.kind.as_str().to_string());
        github.insert("ref".to_string(), event.git_ref());
        github.insert("ref_name".to_string(), event.branch.clone());
        if event.kind == crate::core::trigger::EventKind::PullRequest {
            github.insert("base_ref".to_string(), event.branch.clone());
        }

        Self {
            matrix: variant.values.clone(),
            env: BTreeMap::new(),
            github,
        }
    }

    /// Look up a dotted expression name
    pub fn lookup(&self, name: &str) -> Option<&String> {
        let (scope, key) = name.split_once('.')?;
        match scope {
            "matrix" => self.matrix.get(key),
            "env" => self.env.get(key),
            "github" => self.github.get(key),
            _ => None,
        }
    }

    /// Render a template, replacing `${{ name }}` with its value.
    ///
    /// Unknown names render as the empty string.
    pub fn render(&self, template: &str) -> String {
        expression_regex()
            .replace_all(template, |caps: &regex::Captures<'_>| {
                self.lookup(&caps[1]).cloned().unwrap_or_default()
            })
            .into_owned()
    }

    /// Layer an environment map over the current one, rendering values first
    pub fn extend_env(&mut self, env: &BTreeMap<String, String>) {
        for (key, value) in env {
            let rendered = self.render(value);
            self.env.insert(key.clone(), rendered);
        }
    }
}

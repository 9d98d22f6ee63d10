//! Build matrix expansion

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Matrix definition for a job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Matrix {
    /// Axis name -> values, in declared order
    pub axes: BTreeMap<String, Vec<String>>,

    /// Partial combinations to drop from the product
    pub exclude: Vec<BTreeMap<String, String>>,
}

/// One concrete combination of matrix values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixVariant {
    /// Position in the expanded matrix
    pub index: usize,

    /// Axis name -> value for this variant
    pub values: BTreeMap<String, String>,
}

impl MatrixVariant {
    /// Value of an axis in this variant
    pub fn get(&self, axis: &str) -> Option<&String> {
        self.values.get(axis)
    }

    /// Stable human-readable label, e.g. `toolchain=nightly`
    pub fn label(&self) -> String {
        if self.values.is_empty() {
            return "default".to_string();
        }
        self.values
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Label usable as a directory name
    pub fn slug(&self) -> String {
        self.values
            .values()
            .map(|v| {
                v.chars()
                    .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("-")
    }
}

impl fmt::Display for MatrixVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl Matrix {
    /// A matrix with a single axis
    pub fn single_axis(name: &str, values: &[&str]) -> Self {
        let mut axes = BTreeMap::new();
        axes.insert(
            name.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
        Self {
            axes,
            exclude: Vec::new(),
        }
    }

    /// Expand to the cartesian product of all axes minus excluded combinations.
    ///
    /// Axes are ordered by name; values keep their declared order, with the
    /// last axis varying fastest. A matrix without axes yields one empty variant.
    pub fn expand(&self) -> Vec<MatrixVariant> {
        let mut combinations: Vec<BTreeMap<String, String>> = vec![BTreeMap::new()];

        for (axis, values) in &self.axes {
            combinations = combinations
                .into_iter()
                .flat_map(|combo| {
                    values.iter().map(move |value| {
                        let mut next = combo.clone();
                        next.insert(axis.clone(), value.clone());
                        next
                    })
                })
                .collect();
        }

        combinations
            .into_iter()
            .filter(|combo| !self.is_excluded(combo))
            .enumerate()
            .map(|(index, values)| MatrixVariant { index, values })
            .collect()
    }

    fn is_excluded(&self, combo: &BTreeMap<String, String>) -> bool {
        self.exclude.iter().any(|rule| {
            rule.iter()
                .all(|(axis, value)| combo.get(axis) == Some(value))
        })
    }
}

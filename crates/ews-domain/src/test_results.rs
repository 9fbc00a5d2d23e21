//! Structured results written by test runners (`--json-output=<file>`).
//!
//! Only the failure categories matter here: `Timedout`, `Crashed` and `Failed`,
//! each a list of objects carrying at least a fully-qualified test `name`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

const CATEGORY_KEYS: [&str; 3] = ["Timedout", "Crashed", "Failed"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureCategory {
    Timedout,
    Crashed,
    Failed,
}

/// One failing test. Fields other than `name` are kept but not interpreted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestFailure {
    pub name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TestFailure {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TestRunResult {
    #[serde(rename = "Timedout", default)]
    pub timed_out: Vec<TestFailure>,
    #[serde(rename = "Crashed", default)]
    pub crashed: Vec<TestFailure>,
    #[serde(rename = "Failed", default)]
    pub failed: Vec<TestFailure>,
}

impl TestRunResult {
    /// Parse a results file. The top level must be an object carrying at
    /// least one failure category; anything else means the runner did not
    /// produce results.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let has_category = value
            .as_object()
            .is_some_and(|map| CATEGORY_KEYS.iter().any(|key| map.contains_key(*key)));
        if !has_category {
            return Err(DomainError::MissingTestCategories);
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn category(&self, category: FailureCategory) -> &[TestFailure] {
        match category {
            FailureCategory::Timedout => &self.timed_out,
            FailureCategory::Crashed => &self.crashed,
            FailureCategory::Failed => &self.failed,
        }
    }

    /// Union of failing test names across all categories.
    pub fn failure_names(&self) -> BTreeSet<String> {
        self.timed_out
            .iter()
            .chain(&self.crashed)
            .chain(&self.failed)
            .map(|f| f.name.clone())
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        !(self.timed_out.is_empty() && self.crashed.is_empty() && self.failed.is_empty())
    }
}

//! Records of executed steps and the final report of a build.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{BuildMessage, StepSummary};
use crate::properties::BuildProperties;
use crate::result::StepResult;

/// Identity of one build. Result blobs and artifacts are scoped by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BuildId(pub Uuid);

impl BuildId {
    pub fn new() -> Self {
        BuildId(Uuid::new_v4())
    }
}

impl Default for BuildId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Link attached to a step (patch, bug, author, result archive).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepUrl {
    pub name: String,
    pub url: String,
}

/// One executed (or condition-skipped) step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepRecord {
    pub name: String,
    pub result: StepResult,
    pub summary: StepSummary,
    pub urls: Vec<StepUrl>,
    /// Skipped by its run condition; not shown on dashboards.
    pub hidden: bool,
    pub log: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl StepRecord {
    pub fn summary_line(&self) -> String {
        self.summary.render(self.result)
    }
}

/// Everything known about a build once it is terminal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildReport {
    pub build_id: BuildId,
    /// Digest of the ordered step names the build was configured with.
    pub pipeline_digest: String,
    pub properties: BuildProperties,
    pub steps: Vec<StepRecord>,
    pub result: StepResult,
    pub message: BuildMessage,
    pub duration_ms: u64,
}

impl BuildReport {
    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Steps that actually ran, in order.
    pub fn executed_steps(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(|s| !s.hidden)
    }

    pub fn ran(&self, name: &str) -> bool {
        self.executed_steps().any(|s| s.name == name)
    }
}

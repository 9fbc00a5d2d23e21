//! Structured step summaries and build outcome messages.
//!
//! Steps and the engine only produce these values; text is rendered through
//! `Display` / [`StepSummary::render`] when something is shown to a person.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::result::StepResult;

/// What a counted failure is called in a summary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureUnit {
    StyleError,
    ApiTest,
}

impl FailureUnit {
    fn describe(&self, count: u32) -> String {
        let plural = if count == 1 { "" } else { "s" };
        match self {
            FailureUnit::StyleError => format!("{count} style error{plural}"),
            FailureUnit::ApiTest => format!("{count} api test{plural} failed or timed out"),
        }
    }
}

/// One-line summary of a finished step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepSummary {
    /// Completed description; the result is appended unless the step succeeded.
    Done { text: String },
    /// Text shown exactly as written.
    Text { text: String },
    /// Summary of a step that counts failures in its output.
    FailureCount {
        step: String,
        count: u32,
        unit: FailureUnit,
    },
}

impl StepSummary {
    pub fn done(text: impl Into<String>) -> Self {
        StepSummary::Done { text: text.into() }
    }

    pub fn text(text: impl Into<String>) -> Self {
        StepSummary::Text { text: text.into() }
    }

    pub fn render(&self, result: StepResult) -> String {
        match self {
            StepSummary::Done { text } => {
                if result.is_success() {
                    text.clone()
                } else {
                    format!("{text} ({result})")
                }
            }
            StepSummary::Text { text } => text.clone(),
            StepSummary::FailureCount { step, count, unit } => {
                if result.is_success() {
                    return step.clone();
                }
                let status = if *count > 0 {
                    unit.describe(*count)
                } else {
                    step.clone()
                };
                format!("{status} ({result})")
            }
        }
    }
}

/// Terminal message of a build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildMessage {
    IrrelevantPatch { patch_id: Option<u64> },
    BugClosed { bug_id: u64 },
    PatchObsolete { patch_id: u64 },
    PatchRejected { patch_id: u64 },
    BuildRegression { patch_id: Option<u64> },
    ApiTestsPassed,
    /// Test names are already stripped of their namespace prefix.
    NewApiTestFailures { names: Vec<String> },
    PreExistingApiTestFailures { count: usize },
    UnparseableApiTestResults,
    StepFailed { step: String },
    Cancelled,
    Completed { failed_steps: Vec<String> },
}

fn id_or_empty(id: &Option<u64>) -> String {
    id.map(|id| id.to_string()).unwrap_or_default()
}

impl fmt::Display for BuildMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildMessage::IrrelevantPatch { patch_id } => {
                write!(f, "Patch {} doesn't have relevant changes", id_or_empty(patch_id))
            }
            BuildMessage::BugClosed { bug_id } => write!(f, "Bug {bug_id} is already closed"),
            BuildMessage::PatchObsolete { patch_id } => write!(f, "Patch {patch_id} is obsolete"),
            BuildMessage::PatchRejected { patch_id } => write!(f, "Patch {patch_id} is marked r-"),
            BuildMessage::BuildRegression { patch_id } => {
                write!(f, "Patch {} does not build", id_or_empty(patch_id))
            }
            BuildMessage::ApiTestsPassed => f.write_str("Passed API tests"),
            BuildMessage::NewApiTestFailures { names } => write!(
                f,
                "Found {} new API Tests failures: {}",
                names.len(),
                names.join(", ")
            ),
            BuildMessage::PreExistingApiTestFailures { count } => {
                write!(f, "Found {count} pre-existing API tests failures")
            }
            BuildMessage::UnparseableApiTestResults => {
                f.write_str("Unable to parse API test results")
            }
            BuildMessage::StepFailed { step } => write!(f, "Failed {step}"),
            BuildMessage::Cancelled => f.write_str("Build cancelled"),
            BuildMessage::Completed { failed_steps } => {
                if failed_steps.is_empty() {
                    f.write_str("Build successful")
                } else {
                    write!(f, "Failed {}", failed_steps.join(", "))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_done_summary_appends_result() {
        let summary = StepSummary::done("Compiled WebKit");
        assert_eq!(summary.render(StepResult::Success), "Compiled WebKit");
        assert_eq!(summary.render(StepResult::Failure), "Compiled WebKit (failure)");
    }

    #[test]
    fn test_text_summary_is_verbatim() {
        let summary = StepSummary::text("Patch does not apply");
        assert_eq!(summary.render(StepResult::Failure), "Patch does not apply");
    }

    #[test]
    fn test_failure_count_summary() {
        let summary = StepSummary::FailureCount {
            step: "run-api-tests".to_string(),
            count: 3,
            unit: FailureUnit::ApiTest,
        };
        assert_eq!(summary.render(StepResult::Success), "run-api-tests");
        assert_eq!(
            summary.render(StepResult::Failure),
            "3 api tests failed or timed out (failure)"
        );

        let one = StepSummary::FailureCount {
            step: "check-webkit-style".to_string(),
            count: 1,
            unit: FailureUnit::StyleError,
        };
        assert_eq!(one.render(StepResult::Failure), "1 style error (failure)");

        let none_counted = StepSummary::FailureCount {
            step: "check-webkit-style".to_string(),
            count: 0,
            unit: FailureUnit::StyleError,
        };
        assert_eq!(
            none_counted.render(StepResult::Failure),
            "check-webkit-style (failure)"
        );
    }

    #[test]
    fn test_build_messages() {
        assert_eq!(
            BuildMessage::IrrelevantPatch { patch_id: Some(12) }.to_string(),
            "Patch 12 doesn't have relevant changes"
        );
        assert_eq!(
            BuildMessage::PatchRejected { patch_id: 5 }.to_string(),
            "Patch 5 is marked r-"
        );
        assert_eq!(
            BuildMessage::NewApiTestFailures {
                names: vec!["A.one".to_string(), "B.two".to_string()]
            }
            .to_string(),
            "Found 2 new API Tests failures: A.one, B.two"
        );
        assert_eq!(
            BuildMessage::PreExistingApiTestFailures { count: 4 }.to_string(),
            "Found 4 pre-existing API tests failures"
        );
        assert_eq!(
            BuildMessage::Completed { failed_steps: vec![] }.to_string(),
            "Build successful"
        );
    }
}

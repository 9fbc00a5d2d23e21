//! Flaky-test disambiguation for API tests.
//!
//! Three result sets are compared: the first and second run with the patch
//! and one run on the clean tree. A test only counts against the patch if it
//! failed in both patched runs and not on the clean tree.

use std::collections::BTreeSet;

use ews_domain::{BuildMessage, StepResult, StepSummary, TestRunResult};

use crate::engine::StepContext;
use crate::error::Result;
use crate::step::StepOutcome;
use crate::test_runs::{RERUN_API_TESTS, RUN_API_TESTS, RUN_API_TESTS_WITHOUT_PATCH};

/// Prefix carried by every API test name, dropped from verdict messages.
pub const API_TEST_NAMESPACE: &str = "TestWebKitAPI.";

/// Failure sets derived from three runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlakeAnalysis {
    pub first_run: BTreeSet<String>,
    pub second_run: BTreeSet<String>,
    pub clean_tree: BTreeSet<String>,
    /// Failed in both runs with the patch.
    pub failures_with_patch: BTreeSet<String>,
    /// Failed with the patch and passed on the clean tree.
    pub new_failures: BTreeSet<String>,
}

impl FlakeAnalysis {
    pub fn compute(first: &TestRunResult, second: &TestRunResult, clean: &TestRunResult) -> Self {
        let first_run = first.failure_names();
        let second_run = second.failure_names();
        let clean_tree = clean.failure_names();
        let failures_with_patch: BTreeSet<String> =
            first_run.intersection(&second_run).cloned().collect();
        let new_failures = failures_with_patch
            .difference(&clean_tree)
            .cloned()
            .collect();
        Self {
            first_run,
            second_run,
            clean_tree,
            failures_with_patch,
            new_failures,
        }
    }

    pub fn verdict(&self) -> Verdict {
        if self.new_failures.is_empty() {
            Verdict::Pass {
                pre_existing: self.clean_tree.len(),
            }
        } else {
            Verdict::Fail {
                new_failures: self.new_failures.iter().cloned().collect(),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No new failures; `pre_existing` failures also fail on the clean tree.
    Pass { pre_existing: usize },
    /// Sorted names of tests the patch broke.
    Fail { new_failures: Vec<String> },
    /// A result set was missing or unreadable.
    Retry,
}

impl Verdict {
    pub fn result(&self) -> StepResult {
        match self {
            Verdict::Pass { .. } => StepResult::Success,
            Verdict::Fail { .. } => StepResult::Failure,
            Verdict::Retry => StepResult::Retry,
        }
    }

    pub fn message(&self) -> BuildMessage {
        match self {
            Verdict::Pass { pre_existing } => BuildMessage::PreExistingApiTestFailures {
                count: *pre_existing,
            },
            Verdict::Fail { new_failures } => BuildMessage::NewApiTestFailures {
                names: new_failures
                    .iter()
                    .map(|name| name.replace(API_TEST_NAMESPACE, ""))
                    .collect(),
            },
            Verdict::Retry => BuildMessage::UnparseableApiTestResults,
        }
    }
}

/// Verdict from the three result sets; any missing set means RETRY.
pub fn disambiguate(
    first: Option<&TestRunResult>,
    second: Option<&TestRunResult>,
    clean: Option<&TestRunResult>,
) -> Verdict {
    match (first, second, clean) {
        (Some(first), Some(second), Some(clean)) => {
            FlakeAnalysis::compute(first, second, clean).verdict()
        }
        _ => Verdict::Retry,
    }
}

async fn load_results(ctx: &mut StepContext<'_>, step_name: &str) -> Option<TestRunResult> {
    let blob = match ctx.services.results.get(&ctx.build_id, step_name).await {
        Ok(Some(blob)) => blob,
        Ok(None) => {
            ctx.add_log(format!("ERROR: no results found for {step_name}"));
            return None;
        }
        Err(e) => {
            ctx.add_log(format!("ERROR: unable to load results of {step_name}: {e}"));
            return None;
        }
    };
    match TestRunResult::from_json(&blob) {
        Ok(results) => Some(results),
        Err(e) => {
            ctx.add_log(format!("ERROR: unable to parse data, exception: {e}"));
            None
        }
    }
}

fn log_failures(ctx: &mut StepContext<'_>, heading: &str, names: &BTreeSet<String>) {
    let list: Vec<&str> = names.iter().map(String::as_str).collect();
    ctx.add_log(format!("{heading} ({}): {}", names.len(), list.join(", ")));
}

/// `analyze-api-tests-results`: always finishes the build.
pub async fn analyze_api_tests(ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
    let first = load_results(ctx, RUN_API_TESTS).await;
    let second = load_results(ctx, RERUN_API_TESTS).await;
    let clean = load_results(ctx, RUN_API_TESTS_WITHOUT_PATCH).await;

    if let (Some(first), Some(second), Some(clean)) = (&first, &second, &clean) {
        let analysis = FlakeAnalysis::compute(first, second, clean);
        log_failures(ctx, "Failures in first run", &analysis.first_run);
        log_failures(ctx, "Failures in second run", &analysis.second_run);
        log_failures(ctx, "Failures with patch", &analysis.failures_with_patch);
        log_failures(ctx, "Failures on clean tree", &analysis.clean_tree);
    }

    let verdict = disambiguate(first.as_ref(), second.as_ref(), clean.as_ref());
    let message = verdict.message();
    let result = verdict.result();
    ctx.add_log(message.to_string());
    Ok(StepOutcome::new(result, StepSummary::text(message.to_string()))
        .finish_build(result, message))
}

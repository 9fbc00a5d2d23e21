//! Test-running steps: shell test suites, style checking, JavaScriptCore,
//! API and layout tests.

use std::sync::LazyLock;

use ews_domain::{BuildMessage, BuildProperties, FailureUnit, Flag, StepResult, StepSummary};
use regex::Regex;

use crate::compile::append_custom_build_flags;
use crate::engine::StepContext;
use crate::error::Result;
use crate::metrics::METRICS;
use crate::services::CommandSpec;
use crate::step::{ApiRun, JscRun, ShellCommand, StepOutcome};

pub const RUN_API_TESTS: &str = "run-api-tests";
pub const RERUN_API_TESTS: &str = "re-run-api-tests";
pub const RUN_API_TESTS_WITHOUT_PATCH: &str = "run-api-tests-without-patch";

pub const API_TEST_RESULTS: &str = "api_test_results.json";
pub const JSC_TEST_RESULTS: &str = "jsc_results.json";

/// Directory layout tests write their results into.
pub const LAYOUT_TEST_RESULTS_DIR: &str = "layout-test-results";

static API_SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Ran (?P<ran>\d+) tests of (?P<total>\d+) with (?P<passed>\d+) successful")
        .expect("valid regex")
});
static STYLE_SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Total errors found: (?P<errors>\d+) in (?P<files>\d+) files")
        .expect("valid regex")
});

fn configuration_flag(props: &BuildProperties) -> Option<String> {
    props.configuration().map(|c| c.flag())
}

/// Failed API tests from the runner's `Ran N tests of T with P successful` line.
pub fn count_api_failures(text: &str) -> u32 {
    let Some(caps) = API_SUMMARY.captures(text) else {
        return 0;
    };
    let ran: u32 = caps["ran"].parse().unwrap_or(0);
    let passed: u32 = caps["passed"].parse().unwrap_or(0);
    ran.saturating_sub(passed)
}

/// Errors reported by `check-webkit-style`.
pub fn count_style_errors(text: &str) -> u32 {
    STYLE_SUMMARY
        .captures(text)
        .and_then(|caps| caps["errors"].parse().ok())
        .unwrap_or(0)
}

pub async fn run_shell(ctx: &mut StepContext<'_>, shell: &ShellCommand) -> Result<StepOutcome> {
    let mut spec = CommandSpec::new((shell.command)(ctx.properties));
    if let Some(json) = shell.json_output {
        spec = spec.logfile(json);
    }
    let output = ctx.run_command(spec).await?;
    if shell.json_output.is_some() {
        ctx.store_results(&output).await?;
    }
    let result = if output.did_fail() {
        StepResult::Failure
    } else {
        StepResult::Success
    };
    Ok(StepOutcome::new(result, StepSummary::done(shell.done)))
}

pub async fn check_style(ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
    let spec = CommandSpec::new(vec!["Tools/Scripts/check-webkit-style".to_string()]);
    let output = ctx.run_command(spec).await?;
    let count = count_style_errors(&output.combined());
    let result = if count > 0 || output.did_fail() {
        StepResult::Failure
    } else {
        StepResult::Success
    };
    Ok(StepOutcome::new(
        result,
        StepSummary::FailureCount {
            step: ctx.step_name.to_string(),
            count,
            unit: FailureUnit::StyleError,
        },
    ))
}

pub fn jsc_command(run: JscRun, props: &BuildProperties) -> Vec<String> {
    let mut command = vec![
        "perl".to_string(),
        "Tools/Scripts/run-javascriptcore-tests".to_string(),
    ];
    // The tip-of-tree run rebuilds the clean tree itself.
    if run != JscRun::TipOfTree {
        command.push("--no-build".to_string());
    }
    command.push("--no-fail-fast".to_string());
    command.push(format!("--json-output={JSC_TEST_RESULTS}"));
    command.extend(configuration_flag(props));
    append_custom_build_flags(&mut command, props);
    command
}

pub async fn run_jsc_tests(ctx: &mut StepContext<'_>, run: JscRun) -> Result<StepOutcome> {
    let spec = CommandSpec::new(jsc_command(run, ctx.properties)).logfile(JSC_TEST_RESULTS);
    let output = ctx.run_command(spec).await?;
    ctx.store_results(&output).await?;

    let failed = output.did_fail();
    match run {
        JscRun::First if failed => ctx.properties.set_flag(Flag::PatchFailedJscTests, true),
        JscRun::Rerun => {
            ctx.properties.set_flag(Flag::PatchFailedJscTests, failed);
            if !failed {
                METRICS.inc_flaky_runs_absorbed();
            }
        }
        _ => {}
    }

    let result = if failed {
        StepResult::Failure
    } else {
        StepResult::Success
    };
    Ok(StepOutcome::new(result, StepSummary::done("jscore-tests")))
}

pub fn api_command(props: &BuildProperties) -> Vec<String> {
    let mut command = vec![
        "python".to_string(),
        "Tools/Scripts/run-api-tests".to_string(),
        "--no-build".to_string(),
    ];
    command.extend(configuration_flag(props));
    command.push("--verbose".to_string());
    command.push(format!("--json-output={API_TEST_RESULTS}"));
    append_custom_build_flags(&mut command, props);
    command
}

/// One API test run. A pass on the patched tree finishes the build; a
/// second failure raises `PatchFailedApiTests` so the clean-tree
/// comparison runs.
pub async fn run_api_tests(ctx: &mut StepContext<'_>, run: ApiRun) -> Result<StepOutcome> {
    let spec = CommandSpec::new(api_command(ctx.properties)).logfile(API_TEST_RESULTS);
    let output = ctx.run_command(spec).await?;
    ctx.store_results(&output).await?;

    let count = count_api_failures(&output.combined());
    let result = if count > 0 || output.did_fail() {
        StepResult::Failure
    } else {
        StepResult::Success
    };
    let outcome = StepOutcome::new(
        result,
        StepSummary::FailureCount {
            step: ctx.step_name.to_string(),
            count,
            unit: FailureUnit::ApiTest,
        },
    );

    match (run, result) {
        (ApiRun::First, StepResult::Success) => {
            Ok(outcome.finish_build(StepResult::Success, BuildMessage::ApiTestsPassed))
        }
        (ApiRun::Rerun, StepResult::Success) => {
            METRICS.inc_flaky_runs_absorbed();
            Ok(outcome.finish_build(StepResult::Success, BuildMessage::ApiTestsPassed))
        }
        (ApiRun::Rerun, _) => {
            ctx.properties.set_flag(Flag::PatchFailedApiTests, true);
            Ok(outcome)
        }
        _ => Ok(outcome),
    }
}

pub fn layout_test_command(props: &BuildProperties, webkit1: bool) -> Vec<String> {
    let mut command: Vec<String> = [
        "python",
        "Tools/Scripts/run-webkit-tests",
        "--no-build",
        "--no-new-test-results",
        "--no-show-results",
        "--exit-after-n-failures",
        "30",
        "--skip-failing-tests",
    ]
    .iter()
    .map(|a| a.to_string())
    .collect();
    command.extend(configuration_flag(props));
    if webkit1 {
        command.push("--dump-render-tree".to_string());
    }
    append_custom_build_flags(&mut command, props);
    command.push("--results-directory".to_string());
    command.push(LAYOUT_TEST_RESULTS_DIR.to_string());
    command.push("--debug-rwt-logging".to_string());
    command.extend(props.additional_arguments().iter().cloned());
    command
}

pub async fn run_layout_tests(ctx: &mut StepContext<'_>, webkit1: bool) -> Result<StepOutcome> {
    let spec = CommandSpec::new(layout_test_command(ctx.properties, webkit1));
    let output = ctx.run_command(spec).await?;
    let result = if output.did_fail() {
        StepResult::Failure
    } else {
        StepResult::Success
    };
    Ok(StepOutcome::new(result, StepSummary::done("layout-tests")))
}

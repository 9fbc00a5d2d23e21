//! Engine-level tests: early exits, validation order, halting, compile
//! regressions and cancellation, driven through in-memory fakes.

use std::sync::Arc;

use async_trait::async_trait;
use ews_domain::{
    BugMetadata, BugStatus, BuildConfiguration, BuildMessage, BuildProperties, BuildReport,
    Configuration, Flag, PatchMetadata, ReviewFlag, StepResult,
};
use ews_steps::factory::{self, Factory, FactoryOptions};
use ews_steps::fakes::{FakeServices, MemoryArtifactTransfer, MemoryPatchSource, ScriptedRunner};
use ews_steps::{
    BuildRequest, CancelToken, CheckoutConfig, CommandOutput, CommandRunner, CommandSpec,
    FetchError, Services, Step, StepEngine,
};

const PATCH: u64 = 365230;
const BUG: u64 = 194911;

const JSC_DIFF: &str = "Index: Source/JavaScriptCore/runtime/JSObject.cpp\n\
    --- a/Source/JavaScriptCore/runtime/JSObject.cpp\n\
    +++ b/Source/JavaScriptCore/runtime/JSObject.cpp\n\
    +// fix\n";
const DOCS_DIFF: &str = "Index: Websites/webkit.org/index.html\n\
    +++ b/Websites/webkit.org/index.html\n\
    +<p>typo</p>\n";

fn mac_release() -> BuildConfiguration {
    BuildConfiguration::new("mac-mojave", Some(Configuration::Release))
        .with_architectures(vec!["x86_64".to_string()])
}

fn patch_metadata() -> PatchMetadata {
    PatchMetadata {
        id: PATCH,
        bug_id: Some(BUG),
        author: Some("dev@example.org".to_string()),
        obsolete: false,
        flags: vec![ReviewFlag {
            name: "review".to_string(),
            status: "?".to_string(),
        }],
    }
}

fn bug(status: BugStatus) -> BugMetadata {
    BugMetadata {
        id: BUG,
        status,
        title: "Crash when loading page".to_string(),
    }
}

fn valid_patch(diff: &str) -> MemoryPatchSource {
    MemoryPatchSource::new()
        .with_diff(PATCH, diff)
        .with_patch(patch_metadata())
        .with_bug(bug(BugStatus::New))
}

fn props(builder: &str) -> BuildProperties {
    BuildProperties::new(builder, 7).with_patch(PATCH)
}

async fn run_with(services: Services, props: BuildProperties, steps: Vec<Step>) -> BuildReport {
    StepEngine::new(services)
        .run(BuildRequest::new(props), steps, &CancelToken::new())
        .await
        .expect("build should report")
}

async fn run(fakes: &FakeServices, props: BuildProperties, steps: Vec<Step>) -> BuildReport {
    run_with(fakes.services(), props, steps).await
}

fn validation_steps() -> Vec<Step> {
    vec![
        factory::configure_build(&mac_release()),
        factory::validate_patch(),
        factory::check_style(),
    ]
}

// ---------------------------------------------------------------------------
// Relevance
// ---------------------------------------------------------------------------

#[tokio::test]
async fn irrelevant_patch_skips_build() {
    let fakes = FakeServices::new(ScriptedRunner::new(), valid_patch(DOCS_DIFF));
    let steps = Factory::Jsc.steps(&mac_release(), &FactoryOptions::default());

    let report = run(&fakes, props("JSC-Tests-EWS"), steps).await;

    assert_eq!(report.result, StepResult::Skipped);
    assert_eq!(
        report.message,
        BuildMessage::IrrelevantPatch {
            patch_id: Some(PATCH)
        }
    );
    assert_eq!(
        report.message.to_string(),
        "Patch 365230 doesn't have relevant changes"
    );
    let relevance = report.step("check-patch-relevance").unwrap();
    assert_eq!(relevance.result, StepResult::Failure);
    assert!(!report.ran("validate-patch"));
    assert!(fakes.runner.calls().is_empty());
    assert_eq!(fakes.reporter.finished().len(), 1);
}

#[tokio::test]
async fn relevant_patch_continues() {
    let fakes = FakeServices::new(ScriptedRunner::new(), valid_patch(JSC_DIFF));
    let steps = vec![
        factory::configure_build(&mac_release()),
        factory::check_patch_relevance(&Default::default()),
        factory::validate_patch(),
    ];

    let report = run(&fakes, props("JSC-Tests-EWS"), steps).await;

    assert_eq!(report.result, StepResult::Success);
    assert!(report.ran("validate-patch"));
    assert!(report
        .step("check-patch-relevance")
        .unwrap()
        .log
        .contains("This patch contains relevant changes."));
}

#[tokio::test]
async fn builder_without_topic_accepts_empty_diff() {
    let fakes = FakeServices::new(ScriptedRunner::new(), valid_patch(""));
    let steps = vec![factory::check_patch_relevance(&Default::default())];

    let report = run(&fakes, props("macOS-Mojave-Release-Build-EWS"), steps).await;

    assert_eq!(report.result, StepResult::Success);
    assert_eq!(
        report.step("check-patch-relevance").unwrap().result,
        StepResult::Success
    );
}

#[tokio::test]
async fn relevance_transport_error_warns_and_continues() {
    let source = MemoryPatchSource::new().with_diff_error(
        PATCH,
        FetchError::Transport {
            url: "https://bugs.example.org".to_string(),
            message: "timed out".to_string(),
        },
    );
    let fakes = FakeServices::new(ScriptedRunner::new(), source);
    let steps = vec![
        factory::check_patch_relevance(&Default::default()),
        factory::check_style(),
    ];

    let report = run(&fakes, props("JSC-Tests-EWS"), steps).await;

    assert_eq!(report.result, StepResult::Warnings);
    assert!(report.ran("check-webkit-style"));
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn valid_patch_passes_validation_with_links() {
    let fakes = FakeServices::new(ScriptedRunner::new(), valid_patch(JSC_DIFF));

    let report = run(&fakes, props("Style-EWS"), validation_steps()).await;

    assert_eq!(report.result, StepResult::Success);
    assert_eq!(report.message.to_string(), "Build successful");
    let validate = report.step("validate-patch").unwrap();
    assert!(validate.log.contains("Bug is open."));
    assert!(validate.log.contains("Patch is not marked r-."));
    let names: Vec<&str> = validate.urls.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "Bug 194911 Crash when loading page",
            "Patch by: dev@example.org"
        ]
    );
    assert_eq!(report.properties.bug_id, Some(BUG));
}

#[tokio::test]
async fn closed_bug_is_checked_before_obsolete_and_rejected() {
    let mut patch = patch_metadata();
    patch.obsolete = true;
    patch.flags[0].status = "-".to_string();
    let source = MemoryPatchSource::new()
        .with_patch(patch)
        .with_bug(bug(BugStatus::Resolved));
    let fakes = FakeServices::new(ScriptedRunner::new(), source);

    let report = run(&fakes, props("Style-EWS"), validation_steps()).await;

    assert_eq!(report.result, StepResult::Skipped);
    assert_eq!(report.message, BuildMessage::BugClosed { bug_id: BUG });
    assert_eq!(report.message.to_string(), "Bug 194911 is already closed");
    assert!(!report.ran("check-webkit-style"));
}

#[tokio::test]
async fn obsolete_is_checked_before_rejected() {
    let mut patch = patch_metadata();
    patch.obsolete = true;
    patch.flags[0].status = "-".to_string();
    let source = MemoryPatchSource::new()
        .with_patch(patch)
        .with_bug(bug(BugStatus::Assigned));
    let fakes = FakeServices::new(ScriptedRunner::new(), source);

    let report = run(&fakes, props("Style-EWS"), validation_steps()).await;

    assert_eq!(report.result, StepResult::Skipped);
    assert_eq!(report.message.to_string(), "Patch 365230 is obsolete");
}

#[tokio::test]
async fn rejected_patch_is_skipped() {
    let mut patch = patch_metadata();
    patch.flags[0].status = "-".to_string();
    let source = MemoryPatchSource::new()
        .with_patch(patch)
        .with_bug(bug(BugStatus::New));
    let fakes = FakeServices::new(ScriptedRunner::new(), source);

    let report = run(&fakes, props("Style-EWS"), validation_steps()).await;

    assert_eq!(report.result, StepResult::Skipped);
    assert_eq!(report.message, BuildMessage::PatchRejected { patch_id: PATCH });
    assert_eq!(
        report.step("validate-patch").unwrap().result,
        StepResult::Failure
    );
}

#[tokio::test]
async fn metadata_errors_degrade_to_warnings() {
    let source = MemoryPatchSource::new()
        .with_patch(patch_metadata())
        .with_bug_error(
            BUG,
            FetchError::Transport {
                url: "https://bugs.example.org/rest/bug/194911".to_string(),
                message: "connection reset".to_string(),
            },
        );
    let fakes = FakeServices::new(ScriptedRunner::new(), source);

    let report = run(&fakes, props("Style-EWS"), validation_steps()).await;

    assert_eq!(
        report.step("validate-patch").unwrap().result,
        StepResult::Warnings
    );
    assert_eq!(report.result, StepResult::Warnings);
    assert!(report.ran("check-webkit-style"));
}

#[tokio::test]
async fn mismatched_patch_id_is_indeterminate() {
    let mut other = patch_metadata();
    other.id = PATCH + 1;
    other.obsolete = true;
    let source = MemoryPatchSource::new()
        .with_patch_as(PATCH, other)
        .with_bug(bug(BugStatus::New));
    let fakes = FakeServices::new(ScriptedRunner::new(), source);

    let report = run(&fakes, props("Style-EWS"), validation_steps()).await;

    let validate = report.step("validate-patch").unwrap();
    assert_eq!(validate.result, StepResult::Warnings);
    assert!(validate.log.contains("does not match with requested patch id"));
}

#[tokio::test]
async fn missing_patch_id_fails_validation() {
    let fakes = FakeServices::new(ScriptedRunner::new(), MemoryPatchSource::new());

    let report = run(
        &fakes,
        BuildProperties::new("Style-EWS", 1),
        validation_steps(),
    )
    .await;

    assert_eq!(report.result, StepResult::Failure);
    assert_eq!(
        report.message,
        BuildMessage::StepFailed {
            step: "validate-patch".to_string()
        }
    );
}

// ---------------------------------------------------------------------------
// Halting and conditional steps
// ---------------------------------------------------------------------------

#[tokio::test]
async fn halting_failure_stops_the_build() {
    let runner = ScriptedRunner::new()
        .on("svn-apply", vec![CommandOutput::exited(1)])
        .on("build-webkit", vec![CommandOutput::exited(1)]);
    let fakes = FakeServices::new(runner, valid_patch(JSC_DIFF));
    let steps = vec![
        factory::configure_build(&mac_release()),
        factory::apply_patch(),
        factory::compile_webkit(),
        factory::unapply_patch(&[Flag::PatchFailedToBuild]),
    ];

    let report = run(&fakes, props("macOS-Build-EWS"), steps).await;

    assert_eq!(report.result, StepResult::Failure);
    assert_eq!(report.message.to_string(), "Failed apply-patch");
    assert_eq!(
        report.step("apply-patch").unwrap().summary_line(),
        "Patch does not apply"
    );
    assert_eq!(fakes.runner.count("build-webkit"), 0);
    assert_eq!(report.steps.len(), 2);
    assert_eq!(report.properties.flags().count(), 0);
    assert_eq!(
        fakes.runner.file(".buildbot-diff").as_deref(),
        Some(JSC_DIFF.as_bytes())
    );
    assert_eq!(
        fakes.runner.file(".buildbot-patched").as_deref(),
        Some(&b"patched\n"[..])
    );
}

#[tokio::test]
async fn non_halting_failure_accumulates() {
    let runner = ScriptedRunner::new().on(
        "check-webkit-style",
        vec![CommandOutput::exited(1).with_stdout("Total errors found: 2 in 1 files\n")],
    );
    let fakes = FakeServices::new(runner, valid_patch(JSC_DIFF));
    let steps = vec![factory::check_style(), factory::webkitperl_tests()];

    let report = run(&fakes, props("Style-EWS"), steps).await;

    assert_eq!(report.result, StepResult::Failure);
    assert!(report.ran("webkitperl-tests"));
    assert_eq!(
        report.step("check-webkit-style").unwrap().summary_line(),
        "2 style errors (failure)"
    );
    assert_eq!(report.message.to_string(), "Failed check-webkit-style");
}

#[tokio::test]
async fn condition_skipped_steps_are_hidden() {
    let fakes = FakeServices::new(ScriptedRunner::new(), valid_patch(JSC_DIFF));
    let steps = vec![
        factory::compile_webkit(),
        factory::unapply_patch(&[Flag::PatchFailedToBuild]),
        factory::compile_webkit_tot(),
    ];

    let report = run(&fakes, props("macOS-Build-EWS"), steps).await;

    assert_eq!(report.result, StepResult::Success);
    let unapply = report.step("unapply-patch").unwrap();
    assert!(unapply.hidden);
    assert_eq!(unapply.result, StepResult::Skipped);
    assert_eq!(fakes.runner.count("clean-webkit"), 0);
    assert_eq!(fakes.reporter.steps().len(), 3);
}

#[tokio::test]
async fn collaborator_error_is_an_exception() {
    let source = MemoryPatchSource::new().with_diff_error(
        PATCH,
        FetchError::Transport {
            url: "https://bugs.example.org/attachment.cgi?id=365230".to_string(),
            message: "connection refused".to_string(),
        },
    );
    let fakes = FakeServices::new(ScriptedRunner::new(), source);
    let steps = vec![factory::apply_patch(), factory::compile_webkit()];

    let report = run(&fakes, props("macOS-Build-EWS"), steps).await;

    assert_eq!(report.result, StepResult::Exception);
    let apply = report.step("apply-patch").unwrap();
    assert_eq!(apply.result, StepResult::Exception);
    assert!(apply.log.contains("connection refused"));
    assert!(!report.ran("compile-webkit"));
}

// ---------------------------------------------------------------------------
// Source checkout
// ---------------------------------------------------------------------------

fn checkout_then_apply() -> Vec<Step> {
    vec![
        factory::check_out_source(&CheckoutConfig::default()),
        factory::apply_patch(),
    ]
}

#[tokio::test]
async fn checkout_recovers_on_second_attempt() {
    let runner = ScriptedRunner::new().on(
        "git fetch",
        vec![CommandOutput::exited(128), CommandOutput::exited(0)],
    );
    let fakes = FakeServices::new(runner, valid_patch(JSC_DIFF));

    let report = run(&fakes, props("macOS-Build-EWS"), checkout_then_apply()).await;

    assert_eq!(report.result, StepResult::Success);
    assert_eq!(fakes.runner.count("git fetch"), 2);
    assert_eq!(fakes.runner.count("git reset --hard FETCH_HEAD"), 1);
    let checkout = report.step("clean-and-update-working-directory").unwrap();
    assert_eq!(checkout.result, StepResult::Success);
    assert_eq!(
        checkout.summary_line(),
        "Cleaned and updated working directory"
    );
    assert!(checkout.log.contains("checkout attempt 1 failed, retrying"));
    assert!(report.ran("apply-patch"));
}

#[tokio::test]
async fn checkout_failing_every_attempt_halts() {
    let runner = ScriptedRunner::new().on("git fetch", vec![CommandOutput::exited(128)]);
    let fakes = FakeServices::new(runner, valid_patch(JSC_DIFF));

    let report = run(&fakes, props("macOS-Build-EWS"), checkout_then_apply()).await;

    assert_eq!(report.result, StepResult::Failure);
    assert_eq!(
        report.message.to_string(),
        "Failed clean-and-update-working-directory"
    );
    assert_eq!(fakes.runner.count("git fetch"), 2);
    assert_eq!(fakes.runner.count("git reset"), 0);
    assert_eq!(
        report
            .step("clean-and-update-working-directory")
            .unwrap()
            .summary_line(),
        "Failed to update working directory"
    );
    assert!(!report.ran("apply-patch"));
    assert_eq!(fakes.runner.count("svn-apply"), 0);
}

// ---------------------------------------------------------------------------
// Compile regressions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn compile_failure_with_clean_tot_is_a_regression() {
    let runner = ScriptedRunner::new().on(
        "build-webkit",
        vec![CommandOutput::exited(2), CommandOutput::exited(0)],
    );
    let fakes = FakeServices::new(runner, valid_patch(JSC_DIFF));
    let steps = Factory::Build.steps(&mac_release(), &FactoryOptions::default());

    let report = run(&fakes, props("macOS-Mojave-Release-Build-EWS"), steps).await;

    assert_eq!(report.result, StepResult::Failure);
    assert_eq!(
        report.message,
        BuildMessage::BuildRegression {
            patch_id: Some(PATCH)
        }
    );
    assert_eq!(report.message.to_string(), "Patch 365230 does not build");
    assert!(report.properties.flag(Flag::PatchFailedToBuild));
    assert!(report.ran("unapply-patch"));
    assert_eq!(
        report.step("compile-webkit-tot").unwrap().result,
        StepResult::Success
    );
    assert!(!report.ran("archive-built-product"));
    assert_eq!(fakes.runner.count("build-webkit"), 2);
    let compile = fakes
        .runner
        .calls()
        .into_iter()
        .find(|c| c.to_string().contains("build-webkit"))
        .unwrap();
    assert_eq!(compile.env.get("MFLAGS").map(String::as_str), Some(""));
}

#[tokio::test]
async fn broken_tip_of_tree_halts() {
    let runner = ScriptedRunner::new().on("build-webkit", vec![CommandOutput::exited(1)]);
    let fakes = FakeServices::new(runner, valid_patch(JSC_DIFF));
    let steps = Factory::Build.steps(&mac_release(), &FactoryOptions::default());

    let report = run(&fakes, props("macOS-Mojave-Release-Build-EWS"), steps).await;

    assert_eq!(report.result, StepResult::Failure);
    assert_eq!(
        report.message,
        BuildMessage::StepFailed {
            step: "compile-webkit-tot".to_string()
        }
    );
    assert!(!report.ran("upload-built-product"));
}

#[tokio::test]
async fn successful_build_uploads_product() {
    let runner = ScriptedRunner::new().on(
        "build-webkit",
        vec![CommandOutput::exited(0).with_stdout("a.cpp:1: warning: unused variable\n")],
    );
    let fakes = FakeServices::new(runner, valid_patch(JSC_DIFF));
    let steps = Factory::Build.steps(&mac_release(), &FactoryOptions::default());

    let report = run(&fakes, props("macOS-Mojave-Release-Build-EWS"), steps).await;

    assert_eq!(report.result, StepResult::Warnings);
    assert_eq!(
        report.step("compile-webkit").unwrap().summary_line(),
        "Compiled WebKit (warnings)"
    );
    assert!(!report.ran("compile-webkit-tot"));
    assert!(fakes
        .artifacts
        .contains("archives/mac-mojave-x86_64-release/365230.zip"));
    let configure = report.step("configure-build").unwrap();
    assert_eq!(configure.urls[0].name, "Patch 365230");
}

// ---------------------------------------------------------------------------
// Layout tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn layout_tests_publish_results_even_when_failing() {
    let runner = ScriptedRunner::new().on("run-webkit-tests", vec![CommandOutput::exited(1)]);
    let artifacts =
        MemoryArtifactTransfer::new().with_artifact("archives/mac-mojave-x86_64-release/365230.zip");
    let fakes = FakeServices::new(runner, valid_patch(JSC_DIFF)).with_artifacts(artifacts);
    let steps = Factory::Webkit1Tests.steps(&mac_release(), &FactoryOptions::default());

    let report = run(&fakes, props("macOS-Mojave-Release-WK1-Tests-EWS"), steps).await;

    assert_eq!(report.result, StepResult::Failure);
    assert_eq!(fakes.runner.count("--dump-render-tree"), 1);
    let extract = report.step("extract-test-results").unwrap();
    assert_eq!(extract.urls[0].name, "view layout test results");
    assert_eq!(
        extract.urls[0].url,
        "https://ews.example.org/results/macOS-Mojave-Release-WK1-Tests-EWS/r365230-7/results.html"
    );
}

#[tokio::test]
async fn missing_built_product_halts_test_queue() {
    let fakes = FakeServices::new(ScriptedRunner::new(), valid_patch(JSC_DIFF));
    let steps = Factory::LayoutTests.steps(&mac_release(), &FactoryOptions::default());

    let report = run(&fakes, props("macOS-Mojave-Release-WK2-Tests-EWS"), steps).await;

    assert_eq!(report.result, StepResult::Exception);
    assert_eq!(
        report.step("download-built-product").unwrap().result,
        StepResult::Exception
    );
    assert!(!report.ran("layout-tests"));
}

// ---------------------------------------------------------------------------
// JavaScriptCore reruns
// ---------------------------------------------------------------------------

#[tokio::test]
async fn flaky_jsc_failure_is_absorbed() {
    let runner = ScriptedRunner::new().on(
        "run-javascriptcore-tests",
        vec![CommandOutput::exited(1), CommandOutput::exited(0)],
    );
    let fakes = FakeServices::new(runner, valid_patch(JSC_DIFF));
    let steps = Factory::Jsc.steps(
        &BuildConfiguration::new("jsc-only", Some(Configuration::Release)),
        &FactoryOptions::default(),
    );

    let report = run(&fakes, props("JSC-Tests-EWS"), steps).await;

    assert_eq!(report.result, StepResult::Warnings);
    assert!(report.ran("jscore-test-rerun"));
    assert!(!report.ran("jscore-test-tot"));
    assert!(!report.properties.flag(Flag::PatchFailedJscTests));
    assert_eq!(fakes.runner.count("run-javascriptcore-tests"), 2);
}

#[tokio::test]
async fn consistent_jsc_failure_runs_tip_of_tree() {
    let runner =
        ScriptedRunner::new().on("run-javascriptcore-tests", vec![CommandOutput::exited(1)]);
    let fakes = FakeServices::new(runner, valid_patch(JSC_DIFF));
    let steps = Factory::Jsc.steps(
        &BuildConfiguration::new("jsc-only", Some(Configuration::Release)),
        &FactoryOptions::default(),
    );

    let report = run(&fakes, props("JSC-Tests-EWS"), steps).await;

    assert_eq!(report.result, StepResult::Failure);
    assert!(report.ran("jscore-test-tot"));
    assert!(report.properties.flag(Flag::PatchFailedJscTests));
    let tot = fakes
        .runner
        .calls()
        .into_iter()
        .filter(|c| c.to_string().contains("run-javascriptcore-tests"))
        .last()
        .unwrap();
    assert!(!tot.argv.contains(&"--no-build".to_string()));
    assert_eq!(report.message.to_string(), "Failed jscore-test-rerun");
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelled_before_start_runs_nothing() {
    let fakes = FakeServices::new(ScriptedRunner::new(), valid_patch(JSC_DIFF));
    let cancel = CancelToken::new();
    cancel.cancel();

    let report = StepEngine::new(fakes.services())
        .run(
            BuildRequest::new(props("Style-EWS")),
            validation_steps(),
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(report.result, StepResult::Exception);
    assert_eq!(report.message, BuildMessage::Cancelled);
    assert!(report.steps.is_empty());
    assert_eq!(
        fakes.reporter.finished()[0].1.to_string(),
        "Build cancelled"
    );
}

/// Cancels the build from inside the first command it runs.
struct CancellingRunner {
    inner: ScriptedRunner,
    token: CancelToken,
}

#[async_trait]
impl CommandRunner for CancellingRunner {
    async fn run(&self, spec: &CommandSpec) -> ews_steps::Result<CommandOutput> {
        self.token.cancel();
        self.inner.run(spec).await
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> ews_steps::Result<()> {
        self.inner.write_file(path, contents).await
    }
}

#[tokio::test]
async fn cancellation_lets_running_step_finish() {
    let fakes = FakeServices::new(ScriptedRunner::new(), valid_patch(JSC_DIFF));
    let cancel = CancelToken::new();
    let mut services = fakes.services();
    services.runner = Arc::new(CancellingRunner {
        inner: ScriptedRunner::new(),
        token: cancel.clone(),
    });
    let steps = vec![factory::check_style(), factory::webkitperl_tests()];

    let report = StepEngine::new(services)
        .run(BuildRequest::new(props("Style-EWS")), steps, &cancel)
        .await
        .unwrap();

    assert_eq!(report.result, StepResult::Exception);
    assert_eq!(report.message, BuildMessage::Cancelled);
    assert_eq!(
        report.step("check-webkit-style").unwrap().result,
        StepResult::Success
    );
    assert!(!report.ran("webkitperl-tests"));
}

#[tokio::test]
async fn pipeline_digest_is_recorded() {
    let fakes = FakeServices::new(ScriptedRunner::new(), valid_patch(JSC_DIFF));
    let steps = validation_steps();
    let expected = ews_steps::step::pipeline_digest(&steps);

    let report = run(&fakes, props("Style-EWS"), steps).await;

    assert_eq!(report.pipeline_digest, expected);
}

//! Step catalogue and the ordered step lists each queue runs.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use ews_domain::{BuildConfiguration, BuildProperties, Flag};
use serde::{Deserialize, Serialize};

use crate::checkout::CheckoutConfig;
use crate::relevance::TopicTable;
use crate::step::{
    ApiRun, CompileTarget, JscRun, RunCondition, ShellCommand, Step, StepKind, StepPolicy, Tree,
};
use crate::test_runs::{RERUN_API_TESTS, RUN_API_TESTS, RUN_API_TESTS_WITHOUT_PATCH};

pub const BINDINGS_TEST_RESULTS: &str = "bindings_test_results.json";
pub const WEBKITPY_TEST_RESULTS: &str = "webkitpy_test_results.json";

const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);
const SCRIPT_TEST_TIMEOUT: Duration = Duration::from_secs(2 * 60);
const HOUSEKEEPING_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Command lines of plain shell steps
// ---------------------------------------------------------------------------

fn argv(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

fn platform_args(props: &BuildProperties, platform: Option<&str>) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(platform) = platform {
        args.push(format!("--platform={platform}"));
    }
    if let Some(configuration) = props.configuration() {
        args.push(configuration.flag());
    }
    args
}

fn clean_webkit_command(_: &BuildProperties) -> Vec<String> {
    argv(&["Tools/Scripts/clean-webkit"])
}

fn bindings_tests_command(_: &BuildProperties) -> Vec<String> {
    vec![
        "Tools/Scripts/run-bindings-tests".to_string(),
        format!("--json-output={BINDINGS_TEST_RESULTS}"),
    ]
}

fn webkitpy_tests_command(_: &BuildProperties) -> Vec<String> {
    vec![
        "Tools/Scripts/test-webkitpy".to_string(),
        format!("--json-output={WEBKITPY_TEST_RESULTS}"),
    ]
}

fn webkitperl_tests_command(_: &BuildProperties) -> Vec<String> {
    argv(&["Tools/Scripts/test-webkitperl"])
}

fn kill_old_processes_command(_: &BuildProperties) -> Vec<String> {
    argv(&["python", "Tools/BuildSlaveSupport/kill-old-processes", "buildbot"])
}

fn clean_build_command(props: &BuildProperties) -> Vec<String> {
    let mut command = argv(&["python", "Tools/BuildSlaveSupport/clean-build"]);
    command.extend(platform_args(props, props.full_platform()));
    command
}

fn archive_built_product_command(props: &BuildProperties) -> Vec<String> {
    let mut command = argv(&["python", "Tools/BuildSlaveSupport/built-product-archive"]);
    command.extend(platform_args(props, props.full_platform()));
    command.push("archive".to_string());
    command
}

fn extract_built_product_command(props: &BuildProperties) -> Vec<String> {
    let mut command = argv(&["python", "Tools/BuildSlaveSupport/built-product-archive"]);
    command.extend(platform_args(props, props.full_platform()));
    command.push("extract".to_string());
    command
}

fn archive_test_results_command(props: &BuildProperties) -> Vec<String> {
    let mut command = argv(&["python", "Tools/BuildSlaveSupport/test-result-archive"]);
    command.extend(platform_args(props, props.platform()));
    command.push("archive".to_string());
    command
}

fn shell(
    name: &str,
    command: fn(&BuildProperties) -> Vec<String>,
    done: &'static str,
    json_output: Option<&'static str>,
) -> Step {
    Step::new(
        name,
        StepKind::Shell(ShellCommand {
            command,
            done,
            json_output,
        }),
    )
}

fn when(flags: &[Flag]) -> RunCondition {
    RunCondition::AnyFlag(flags.to_vec())
}

// ---------------------------------------------------------------------------
// Catalogue
// ---------------------------------------------------------------------------

pub fn configure_build(config: &BuildConfiguration) -> Step {
    Step::new("configure-build", StepKind::ConfigureBuild(config.clone()))
}

pub fn check_patch_relevance(topics: &TopicTable) -> Step {
    Step::new(
        "check-patch-relevance",
        StepKind::CheckPatchRelevance(topics.clone()),
    )
    .halt_on_failure()
}

pub fn validate_patch() -> Step {
    Step::new("validate-patch", StepKind::ValidatePatch).halt_on_failure()
}

pub fn print_configuration() -> Step {
    Step::new("configuration", StepKind::PrintConfiguration)
        .policy(StepPolicy::INFORMATIONAL)
        .timeout(HOUSEKEEPING_TIMEOUT)
}

pub fn check_out_source(config: &CheckoutConfig) -> Step {
    Step::new(
        "clean-and-update-working-directory",
        StepKind::CheckOutSource(config.clone()),
    )
    .halt_on_failure()
    .timeout(CHECKOUT_TIMEOUT)
}

pub fn clean_working_directory() -> Step {
    shell(
        "clean-working-directory",
        clean_webkit_command,
        "Cleaned working directory",
        None,
    )
    .halt_on_failure()
}

pub fn apply_patch() -> Step {
    Step::new("apply-patch", StepKind::ApplyPatch).halt_on_failure()
}

/// Revert the patch when a flag says the clean tree is needed.
pub fn unapply_patch(flags: &[Flag]) -> Step {
    shell("unapply-patch", clean_webkit_command, "Unapplied patch", None)
        .halt_on_failure()
        .run_if(when(flags))
}

pub fn check_style() -> Step {
    Step::new("check-webkit-style", StepKind::CheckStyle)
}

pub fn bindings_tests() -> Step {
    shell(
        "bindings-tests",
        bindings_tests_command,
        "bindings-tests",
        Some(BINDINGS_TEST_RESULTS),
    )
}

pub fn webkitpy_tests() -> Step {
    shell(
        "webkitpy-tests",
        webkitpy_tests_command,
        "webkitpy-tests",
        Some(WEBKITPY_TEST_RESULTS),
    )
    .timeout(SCRIPT_TEST_TIMEOUT)
}

pub fn webkitperl_tests() -> Step {
    shell(
        "webkitperl-tests",
        webkitperl_tests_command,
        "webkitperl-tests",
        None,
    )
    .timeout(SCRIPT_TEST_TIMEOUT)
}

pub fn kill_old_processes() -> Step {
    shell(
        "kill-old-processes",
        kill_old_processes_command,
        "Killed old processes",
        None,
    )
    .timeout(HOUSEKEEPING_TIMEOUT)
}

pub fn delete_webkit_build_directory() -> Step {
    shell(
        "delete-WebKitBuild-directory",
        clean_build_command,
        "Deleted WebKitBuild directory",
        None,
    )
}

pub fn compile_webkit() -> Step {
    Step::new(
        "compile-webkit",
        StepKind::Compile {
            target: CompileTarget::WebKit,
            tree: Tree::Patched,
        },
    )
}

pub fn compile_webkit_tot() -> Step {
    Step::new(
        "compile-webkit-tot",
        StepKind::Compile {
            target: CompileTarget::WebKit,
            tree: Tree::TipOfTree,
        },
    )
    .halt_on_failure()
    .run_if(when(&[Flag::PatchFailedToBuild, Flag::PatchFailedApiTests]))
}

pub fn compile_jsc() -> Step {
    Step::new(
        "build-jsc",
        StepKind::Compile {
            target: CompileTarget::Jsc,
            tree: Tree::Patched,
        },
    )
}

pub fn compile_jsc_tot() -> Step {
    Step::new(
        "build-jsc-tot",
        StepKind::Compile {
            target: CompileTarget::Jsc,
            tree: Tree::TipOfTree,
        },
    )
    .halt_on_failure()
    .run_if(when(&[Flag::PatchFailedToBuild]))
}

/// A first failure alone is not trusted, so it only warns; the rerun decides.
pub fn run_jsc_tests() -> Step {
    Step::new("jscore-test", StepKind::RunJscTests(JscRun::First)).policy(StepPolicy::WARN_ONLY)
}

pub fn rerun_jsc_tests() -> Step {
    Step::new("jscore-test-rerun", StepKind::RunJscTests(JscRun::Rerun))
        .run_if(when(&[Flag::PatchFailedJscTests]))
}

/// Reference run on the clean tree; its own result does not judge the patch.
pub fn run_jsc_tests_tot() -> Step {
    Step::new("jscore-test-tot", StepKind::RunJscTests(JscRun::TipOfTree))
        .policy(StepPolicy::INFORMATIONAL)
        .run_if(when(&[Flag::PatchFailedJscTests]))
}

pub fn run_api_tests() -> Step {
    Step::new(RUN_API_TESTS, StepKind::RunApiTests(ApiRun::First))
}

pub fn rerun_api_tests() -> Step {
    Step::new(RERUN_API_TESTS, StepKind::RunApiTests(ApiRun::Rerun))
}

pub fn run_api_tests_without_patch() -> Step {
    Step::new(
        RUN_API_TESTS_WITHOUT_PATCH,
        StepKind::RunApiTests(ApiRun::WithoutPatch),
    )
    .run_if(when(&[Flag::PatchFailedApiTests]))
}

pub fn analyze_api_tests() -> Step {
    Step::new("analyze-api-tests-results", StepKind::AnalyzeApiTests)
        .run_if(when(&[Flag::PatchFailedApiTests]))
}

pub fn run_layout_tests(webkit1: bool) -> Step {
    Step::new("layout-tests", StepKind::RunLayoutTests { webkit1 })
}

pub fn archive_built_product() -> Step {
    shell(
        "archive-built-product",
        archive_built_product_command,
        "Archived built product",
        None,
    )
    .halt_on_failure()
}

pub fn upload_built_product() -> Step {
    Step::new("upload-built-product", StepKind::UploadBuiltProduct).halt_on_failure()
}

pub fn download_built_product() -> Step {
    Step::new("download-built-product", StepKind::DownloadBuiltProduct).halt_on_failure()
}

pub fn extract_built_product() -> Step {
    shell(
        "extract-built-product",
        extract_built_product_command,
        "Extracted built product",
        None,
    )
    .halt_on_failure()
}

pub fn archive_test_results() -> Step {
    shell(
        "archive-test-results",
        archive_test_results_command,
        "Archived test results",
        None,
    )
    .halt_on_failure()
}

pub fn upload_test_results() -> Step {
    Step::new("upload-test-results", StepKind::UploadTestResults).halt_on_failure()
}

pub fn extract_test_results() -> Step {
    Step::new("extract-test-results", StepKind::ExtractTestResults)
}

// ---------------------------------------------------------------------------
// Factories
// ---------------------------------------------------------------------------

/// Settings shared by every factory.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FactoryOptions {
    pub topics: TopicTable,
    pub checkout: CheckoutConfig,
}

/// The kinds of queue a worker can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Factory {
    Style,
    Bindings,
    Webkitpy,
    Webkitperl,
    Jsc,
    Build,
    ApiTests,
    LayoutTests,
    Webkit1Tests,
}

impl Factory {
    pub const ALL: [Factory; 9] = [
        Factory::Style,
        Factory::Bindings,
        Factory::Webkitpy,
        Factory::Webkitperl,
        Factory::Jsc,
        Factory::Build,
        Factory::ApiTests,
        Factory::LayoutTests,
        Factory::Webkit1Tests,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Factory::Style => "style",
            Factory::Bindings => "bindings",
            Factory::Webkitpy => "webkitpy",
            Factory::Webkitperl => "webkitperl",
            Factory::Jsc => "jsc",
            Factory::Build => "build",
            Factory::ApiTests => "api-tests",
            Factory::LayoutTests => "layout-tests",
            Factory::Webkit1Tests => "webkit1-tests",
        }
    }

    /// Ordered steps of a build on this queue.
    pub fn steps(&self, config: &BuildConfiguration, options: &FactoryOptions) -> Vec<Step> {
        let mut steps = vec![
            configure_build(config),
            check_patch_relevance(&options.topics),
            validate_patch(),
            print_configuration(),
            check_out_source(&options.checkout),
            apply_patch(),
        ];

        match self {
            Factory::Style => steps.push(check_style()),
            Factory::Bindings => steps.push(bindings_tests()),
            Factory::Webkitpy => steps.push(webkitpy_tests()),
            Factory::Webkitperl => steps.push(webkitperl_tests()),
            Factory::Jsc => steps.extend([
                kill_old_processes(),
                compile_jsc(),
                unapply_patch(&[Flag::PatchFailedToBuild]),
                compile_jsc_tot(),
                run_jsc_tests(),
                rerun_jsc_tests(),
                unapply_patch(&[Flag::PatchFailedJscTests]),
                run_jsc_tests_tot(),
            ]),
            Factory::Build => steps.extend([
                kill_old_processes(),
                delete_webkit_build_directory(),
                compile_webkit(),
                unapply_patch(&[Flag::PatchFailedToBuild]),
                compile_webkit_tot(),
                archive_built_product(),
                upload_built_product(),
            ]),
            Factory::ApiTests => steps.extend([
                download_built_product(),
                extract_built_product(),
                kill_old_processes(),
                run_api_tests(),
                rerun_api_tests(),
                unapply_patch(&[Flag::PatchFailedApiTests]),
                compile_webkit_tot(),
                run_api_tests_without_patch(),
                analyze_api_tests(),
            ]),
            Factory::LayoutTests | Factory::Webkit1Tests => steps.extend([
                download_built_product(),
                extract_built_product(),
                kill_old_processes(),
                run_layout_tests(*self == Factory::Webkit1Tests),
                archive_test_results(),
                upload_test_results(),
                extract_test_results(),
            ]),
        }
        steps
    }
}

impl fmt::Display for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Factory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Factory::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("unknown factory '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ews_domain::Configuration;

    fn names(steps: &[Step]) -> Vec<&str> {
        steps.iter().map(|s| s.name.as_str()).collect()
    }

    fn release(platform: &str) -> BuildConfiguration {
        BuildConfiguration::new(platform, Some(Configuration::Release))
    }

    #[test]
    fn test_every_factory_starts_with_validation() {
        for factory in Factory::ALL {
            let steps = factory.steps(&release("mac-mojave"), &FactoryOptions::default());
            assert_eq!(
                &names(&steps)[..6],
                &[
                    "configure-build",
                    "check-patch-relevance",
                    "validate-patch",
                    "configuration",
                    "clean-and-update-working-directory",
                    "apply-patch",
                ],
                "{factory}"
            );
        }
    }

    #[test]
    fn test_api_tests_factory_order() {
        let steps = Factory::ApiTests.steps(&release("mac-mojave"), &FactoryOptions::default());
        assert_eq!(
            &names(&steps)[6..],
            &[
                "download-built-product",
                "extract-built-product",
                "kill-old-processes",
                "run-api-tests",
                "re-run-api-tests",
                "unapply-patch",
                "compile-webkit-tot",
                "run-api-tests-without-patch",
                "analyze-api-tests-results",
            ]
        );
        let rerun = steps.iter().find(|s| s.name == "re-run-api-tests").unwrap();
        assert_eq!(rerun.run_if, RunCondition::Always);
    }

    #[test]
    fn test_tot_compile_halts() {
        let step = compile_webkit_tot();
        assert!(step.policy.halt_on_failure);
        assert_eq!(
            step.run_if,
            RunCondition::AnyFlag(vec![Flag::PatchFailedToBuild, Flag::PatchFailedApiTests])
        );
        assert!(!compile_webkit().policy.halt_on_failure);
    }

    #[test]
    fn test_factory_parse_round_trip() {
        for factory in Factory::ALL {
            assert_eq!(factory.as_str().parse::<Factory>().unwrap(), factory);
        }
        assert!("nightly".parse::<Factory>().is_err());
    }

    #[test]
    fn test_shell_commands_render_properties() {
        let mut props = BuildProperties::new("EWS", 1);
        props.apply_configuration(&release("mac-mojave")).unwrap();
        assert_eq!(
            archive_built_product_command(&props),
            argv(&[
                "python",
                "Tools/BuildSlaveSupport/built-product-archive",
                "--platform=mac-mojave",
                "--release",
                "archive",
            ])
        );
        assert_eq!(
            archive_test_results_command(&props)[2],
            "--platform=mac".to_string()
        );
    }

    #[test]
    fn test_timeouts() {
        assert_eq!(check_out_source(&CheckoutConfig::default()).timeout, Some(CHECKOUT_TIMEOUT));
        assert_eq!(webkitpy_tests().timeout, Some(Duration::from_secs(120)));
        assert_eq!(kill_old_processes().timeout, Some(Duration::from_secs(60)));
    }
}

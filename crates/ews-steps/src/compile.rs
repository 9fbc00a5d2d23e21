//! Compile steps for the patched tree and for tip of tree.

use std::sync::LazyLock;

use ews_domain::{BuildMessage, BuildProperties, Flag, StepResult, StepSummary};
use regex::Regex;

use crate::engine::StepContext;
use crate::error::Result;
use crate::services::{CommandOutput, CommandSpec};
use crate::step::{CompileTarget, StepOutcome, Tree};

static WARNING_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r".*arning: .*").expect("valid regex"));

/// Platforms whose build scripts need an explicit platform switch.
const CUSTOM_FLAG_PLATFORMS: &[&str] = &["gtk", "wincairo", "ios", "jsc-only", "wpe"];

impl CompileTarget {
    fn script(&self) -> &'static str {
        match self {
            CompileTarget::WebKit => "Tools/Scripts/build-webkit",
            CompileTarget::Jsc => "Tools/Scripts/build-jsc",
        }
    }

    fn done(&self) -> &'static str {
        match self {
            CompileTarget::WebKit => "Compiled WebKit",
            CompileTarget::Jsc => "Compiled JSC",
        }
    }
}

/// Append `--gtk`, `--ios-simulator`, `--device` and friends.
pub fn append_custom_build_flags(command: &mut Vec<String>, props: &BuildProperties) {
    let Some(platform) = props.platform() else {
        return;
    };
    if !CUSTOM_FLAG_PLATFORMS.contains(&platform) {
        return;
    }
    let full_platform = props.full_platform().unwrap_or_default();
    let flag = if full_platform.starts_with("ios-simulator") {
        "ios-simulator"
    } else if platform == "ios" {
        "device"
    } else {
        platform
    };
    command.push(format!("--{flag}"));
}

/// Full compile command line for the configured queue.
pub fn compile_command(target: CompileTarget, props: &BuildProperties) -> Vec<String> {
    let mut command = vec!["perl".to_string(), target.script().to_string()];
    if let Some(configuration) = props.configuration() {
        command.push(configuration.flag());
    }
    command.extend(props.additional_arguments().iter().cloned());

    let apple = matches!(props.platform(), Some("mac") | Some("ios"));
    if apple {
        if let Some(architecture) = props.architecture() {
            command.push(format!("ARCHS={architecture}"));
            if props.platform() == Some("ios") {
                command.push("ONLY_ACTIVE_ARCH=NO".to_string());
            }
        }
        if props.build_only() {
            command.push("DEBUG_INFORMATION_FORMAT=dwarf-with-dsym".to_string());
            command.push("CLANG_DEBUG_INFORMATION_LEVEL=line-tables-only".to_string());
        }
    }

    append_custom_build_flags(&mut command, props);
    command
}

/// Lines of compiler output that look like warnings.
pub fn count_warnings(output: &CommandOutput) -> usize {
    output
        .combined()
        .lines()
        .filter(|line| WARNING_PATTERN.is_match(line))
        .count()
}

pub async fn compile(
    ctx: &mut StepContext<'_>,
    target: CompileTarget,
    tree: Tree,
) -> Result<StepOutcome> {
    let spec = CommandSpec::new(compile_command(target, ctx.properties)).env("MFLAGS", "");
    let output = ctx.run_command(spec).await?;
    let summary = StepSummary::done(target.done());

    if output.did_fail() {
        if tree == Tree::Patched {
            ctx.properties.set_flag(Flag::PatchFailedToBuild, true);
        }
        return Ok(StepOutcome::failure(summary));
    }

    let warnings = count_warnings(&output);
    let result = if warnings > 0 {
        ctx.add_log(format!("{warnings} warning(s)"));
        StepResult::Warnings
    } else {
        StepResult::Success
    };
    let outcome = StepOutcome::new(result, summary);

    if tree == Tree::TipOfTree && ctx.properties.flag(Flag::PatchFailedToBuild) {
        // Tip of tree builds, so the patch broke the build.
        return Ok(outcome.finish_build(
            StepResult::Failure,
            BuildMessage::BuildRegression {
                patch_id: ctx.properties.patch_id,
            },
        ));
    }
    Ok(outcome)
}

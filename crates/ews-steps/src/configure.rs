//! `configure-build` and `configuration` steps.

use std::sync::LazyLock;

use ews_domain::{BuildConfiguration, StepResult, StepSummary};
use regex::Regex;

use crate::engine::StepContext;
use crate::error::Result;
use crate::services::CommandSpec;
use crate::step::StepOutcome;

/// Host commands whose output describes the worker.
const CONFIGURATION_COMMANDS: &[&[&str]] = &[
    &["hostname"],
    &["df", "-hl"],
    &["date"],
    &["sw_vers"],
    &["xcodebuild", "-sdk", "-version"],
];

/// Longest prefixes first so `10.14` is not shadowed by a shorter key.
const MACOS_NAMES: &[(&str, &str)] = &[
    ("10.14", "Mojave"),
    ("10.13", "High Sierra"),
    ("10.12", "Sierra"),
    ("10.11", "El Capitan"),
    ("10.10", "Yosemite"),
    ("10.9", "Maverick"),
    ("10.8", "Mountain Lion"),
    ("10.7", "Lion"),
    ("10.6", "Snow Leopard"),
    ("10.5", "Leopard"),
];

static PRODUCT_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ProductVersion:[ \t]*(.+?)\n").expect("valid regex"));
static MACOS_SDK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"MacOSX[\s\S]*?SDKVersion:[ \t]*(.+?)\n").expect("valid regex"));
static IOS_SDK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"iPhoneSimulator[\s\S]*?SDKVersion:[ \t]*(.+?)\n").expect("valid regex")
});

/// Write the queue configuration into the build properties.
pub async fn configure_build(
    ctx: &mut StepContext<'_>,
    config: &BuildConfiguration,
) -> Result<StepOutcome> {
    ctx.properties.apply_configuration(config)?;
    if let Some(patch_id) = ctx.properties.patch_id {
        let url = ctx.services.patches.patch_url(patch_id);
        ctx.add_url(format!("Patch {patch_id}"), url);
    }
    Ok(StepOutcome::success(StepSummary::done("Configured build")))
}

/// Print host details. Individual command failures only change the summary.
pub async fn print_configuration(ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
    let mut result = StepResult::Success;
    let mut text = String::new();

    for command in CONFIGURATION_COMMANDS {
        let spec = CommandSpec::new(command.iter().map(|arg| arg.to_string()).collect());
        match ctx.run_command(spec).await {
            Ok(output) => {
                text.push_str(&output.combined());
                if output.did_fail() {
                    result = StepResult::Failure;
                }
            }
            Err(e) => {
                ctx.add_log(e.to_string());
                result = StepResult::Failure;
            }
        }
    }

    if !result.is_success() {
        return Ok(StepOutcome::new(
            result,
            StepSummary::text("Failed to print configuration"),
        ));
    }
    let is_ios = ctx.properties.builder_name.contains("iOS");
    Ok(StepOutcome::success(StepSummary::text(describe_configuration(
        &text, is_ios,
    ))))
}

/// `OS: <name> (<version>), Xcode: <sdk>` from `sw_vers` and `xcodebuild` output.
pub fn describe_configuration(log_text: &str, is_ios_builder: bool) -> String {
    let mut configuration = String::new();
    if let Some(version) = PRODUCT_VERSION.captures(log_text).and_then(|c| c.get(1)) {
        let version = version.as_str().trim();
        configuration = format!("OS: {} ({})", os_name(version), version);
    }

    let sdk = if is_ios_builder { &IOS_SDK } else { &MACOS_SDK };
    if let Some(xcode) = sdk.captures(log_text).and_then(|c| c.get(1)) {
        configuration.push_str(&format!(", Xcode: {}", xcode.as_str().trim()));
    }
    configuration
}

pub fn os_name(version: &str) -> &'static str {
    MACOS_NAMES
        .iter()
        .find(|(prefix, _)| version.starts_with(prefix))
        .map(|(_, name)| *name)
        .unwrap_or("Unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SW_VERS: &str = "ProductName:\tMac OS X\nProductVersion:\t10.14.5\nBuildVersion:\t18F132\n";
    const XCODEBUILD: &str = "MacOSX10.14.sdk - macOS 10.14 (macosx10.14)\nSDKVersion: 10.14\nPath: /x\n\
        iPhoneSimulator12.2.sdk - Simulator - iOS 12.2 (iphonesimulator12.2)\nSDKVersion: 12.2\n";

    #[test]
    fn test_os_name() {
        assert_eq!(os_name("10.14.5"), "Mojave");
        assert_eq!(os_name("10.10.5"), "Yosemite");
        assert_eq!(os_name("10.5"), "Leopard");
        assert_eq!(os_name("11.0"), "Unknown");
        assert_eq!(os_name(""), "Unknown");
    }

    #[test]
    fn test_describe_mac_configuration() {
        let text = format!("{SW_VERS}{XCODEBUILD}");
        assert_eq!(
            describe_configuration(&text, false),
            "OS: Mojave (10.14.5), Xcode: 10.14"
        );
    }

    #[test]
    fn test_describe_ios_configuration() {
        let text = format!("{SW_VERS}{XCODEBUILD}");
        assert_eq!(
            describe_configuration(&text, true),
            "OS: Mojave (10.14.5), Xcode: 12.2"
        );
    }

    #[test]
    fn test_describe_linux_configuration_is_empty() {
        assert_eq!(describe_configuration("builder-1\n/dev/sda1 100G\n", false), "");
    }
}

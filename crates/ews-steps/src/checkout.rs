//! Working-directory steps: source checkout and patch application.

use std::time::Duration;

use ews_domain::StepSummary;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::StepContext;
use crate::error::{FetchError, Result};
use crate::services::CommandSpec;
use crate::step::StepOutcome;

/// File the patch diff is written to before `svn-apply` runs.
pub const PATCH_FILE: &str = ".buildbot-diff";
/// Marker left in the tree so later cleanups know a patch was applied.
pub const PATCHED_MARKER: &str = ".buildbot-patched";

const APPLY_FAILED: &str = "Patch does not apply";

/// Where and how to update the source tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CheckoutConfig {
    pub repo_url: String,
    /// Delay between attempts, in seconds.
    pub retry_delay_secs: u64,
    pub max_attempts: u32,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            repo_url: "https://git.webkit.org/git/WebKit.git".to_string(),
            retry_delay_secs: 0,
            max_attempts: 2,
        }
    }
}

fn argv(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

/// Commands that bring the working directory to the latest upstream commit.
pub fn checkout_commands(config: &CheckoutConfig) -> Vec<CommandSpec> {
    vec![
        CommandSpec::new(argv(&["git", "init", "--quiet"])),
        CommandSpec::new(argv(&["git", "fetch", &config.repo_url])),
        CommandSpec::new(argv(&["git", "reset", "--hard", "FETCH_HEAD"])),
        CommandSpec::new(argv(&["git", "clean", "-f", "-f", "-d", "-x"])),
    ]
}

pub async fn check_out_source(
    ctx: &mut StepContext<'_>,
    config: &CheckoutConfig,
) -> Result<StepOutcome> {
    let attempts = config.max_attempts.max(1);
    for attempt in 1..=attempts {
        if update_working_directory(ctx, config).await? {
            return Ok(StepOutcome::success(StepSummary::text(
                "Cleaned and updated working directory",
            )));
        }
        if attempt < attempts {
            warn!(attempt = attempt, "checkout failed, retrying");
            ctx.add_log(format!("checkout attempt {attempt} failed, retrying"));
            tokio::time::sleep(Duration::from_secs(config.retry_delay_secs)).await;
        }
    }
    Ok(StepOutcome::failure(StepSummary::text(
        "Failed to update working directory",
    )))
}

async fn update_working_directory(
    ctx: &mut StepContext<'_>,
    config: &CheckoutConfig,
) -> Result<bool> {
    for spec in checkout_commands(config) {
        if ctx.run_command(spec).await?.did_fail() {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Write the patch into the tree and apply it with `svn-apply`.
pub async fn apply_patch(ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
    let Some(patch_id) = ctx.properties.patch_id else {
        ctx.add_log("This build doesn't have a patch to apply.");
        return Ok(StepOutcome::failure(StepSummary::text(APPLY_FAILED)));
    };

    let diff = match ctx.services.patches.get_patch(patch_id).await {
        Ok(diff) if !diff.is_empty() => diff,
        Ok(_) | Err(FetchError::NotFound { .. }) => {
            ctx.add_log(format!("Patch {patch_id} has no content."));
            return Ok(StepOutcome::failure(StepSummary::text(APPLY_FAILED)));
        }
        Err(e) => return Err(e.into()),
    };

    let runner = &ctx.services.runner;
    runner.write_file(PATCH_FILE, diff.as_bytes()).await?;
    runner.write_file(PATCHED_MARKER, b"patched\n").await?;

    let output = ctx
        .run_command(CommandSpec::new(argv(&[
            "Tools/Scripts/svn-apply",
            "--force",
            PATCH_FILE,
        ])))
        .await?;
    if output.did_fail() {
        return Ok(StepOutcome::failure(StepSummary::text(APPLY_FAILED)));
    }
    Ok(StepOutcome::success(StepSummary::done("Applied patch")))
}

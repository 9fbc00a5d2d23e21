//! `validate-patch`: skip builds for closed bugs, obsolete patches and
//! patches a reviewer rejected.
//!
//! Every lookup is three-valued. An unknown answer never skips the build,
//! it only downgrades the step to WARNINGS.

use ews_domain::{BuildMessage, PatchMetadata, StepResult, StepSummary};

use crate::engine::StepContext;
use crate::error::Result;
use crate::step::StepOutcome;

const DONE: &str = "Validated patch";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Check {
    Yes,
    No,
    Unknown,
}

pub async fn validate_patch(ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
    let Some(patch_id) = ctx.properties.patch_id else {
        ctx.add_log("No patch_id found. Unable to proceed without patch_id.");
        return Ok(StepOutcome::failure(StepSummary::done(DONE)));
    };

    let patch = fetch_patch(ctx, patch_id).await;
    let bug_id = ctx
        .properties
        .bug_id
        .or_else(|| patch.as_ref().and_then(|p| p.bug_id));
    if ctx.properties.bug_id.is_none() {
        ctx.properties.bug_id = bug_id;
    }

    let bug_closed = is_bug_closed(ctx, bug_id).await;
    if let (Check::Yes, Some(bug_id)) = (bug_closed, bug_id) {
        return Ok(skip_build(ctx, BuildMessage::BugClosed { bug_id }));
    }

    let obsolete = is_patch_obsolete(ctx, patch_id, patch.as_ref());
    if obsolete == Check::Yes {
        return Ok(skip_build(ctx, BuildMessage::PatchObsolete { patch_id }));
    }

    let rejected = match &patch {
        Some(p) if p.is_review_rejected() => Check::Yes,
        Some(_) => Check::No,
        None => Check::Unknown,
    };
    if rejected == Check::Yes {
        return Ok(skip_build(ctx, BuildMessage::PatchRejected { patch_id }));
    }

    if [bug_closed, obsolete, rejected].contains(&Check::Unknown) {
        return Ok(StepOutcome::new(StepResult::Warnings, StepSummary::done(DONE)));
    }

    ctx.add_log("Bug is open.");
    ctx.add_log("Patch is not obsolete.");
    ctx.add_log("Patch is not marked r-.");
    Ok(StepOutcome::success(StepSummary::done(DONE)))
}

async fn fetch_patch(ctx: &mut StepContext<'_>, patch_id: u64) -> Option<PatchMetadata> {
    match ctx.services.patches.get_patch_metadata(patch_id).await {
        Ok(patch) => Some(patch),
        Err(e) => {
            ctx.add_log(format!("Unable to fetch patch {patch_id}: {e}"));
            None
        }
    }
}

async fn is_bug_closed(ctx: &mut StepContext<'_>, bug_id: Option<u64>) -> Check {
    let Some(bug_id) = bug_id else {
        ctx.add_log("Skipping bug status validation since bug id is None.");
        return Check::Unknown;
    };

    let bug = match ctx.services.patches.get_bug_metadata(bug_id).await {
        Ok(bug) => bug,
        Err(e) => {
            ctx.add_log(format!("Unable to fetch bug {bug_id}: {e}"));
            return Check::Unknown;
        }
    };

    let url = ctx.services.patches.bug_url(bug_id);
    ctx.add_url(format!("Bug {} {}", bug_id, bug.title), url);
    if bug.status.is_closed() {
        Check::Yes
    } else {
        Check::No
    }
}

fn is_patch_obsolete(
    ctx: &mut StepContext<'_>,
    patch_id: u64,
    patch: Option<&PatchMetadata>,
) -> Check {
    let Some(patch) = patch else {
        return Check::Unknown;
    };
    if patch.id != patch_id {
        ctx.add_log(format!(
            "Fetched patch id {} does not match with requested patch id {}. Unable to validate.",
            patch.id, patch_id
        ));
        return Check::Unknown;
    }
    if let Some(author) = &patch.author {
        ctx.add_url(format!("Patch by: {author}"), format!("mailto:{author}"));
    }
    if patch.obsolete {
        Check::Yes
    } else {
        Check::No
    }
}

fn skip_build(ctx: &mut StepContext<'_>, message: BuildMessage) -> StepOutcome {
    let reason = message.to_string();
    ctx.add_log(&reason);
    StepOutcome::failure(StepSummary::text(reason)).finish_build(StepResult::Skipped, message)
}

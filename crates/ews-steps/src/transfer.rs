//! Steps that move built products and test results through controller storage.

use ews_domain::{BuildProperties, StepSummary};

use crate::engine::StepContext;
use crate::error::Result;
use crate::services::ArtifactKey;
use crate::step::StepOutcome;

/// Archive the layout-test results step leaves in the working directory.
pub const TEST_RESULTS_ARCHIVE: &str = "layout-test-results.zip";

/// Where `built-product-archive` leaves the archive, e.g. `WebKitBuild/release.zip`.
pub fn built_product_path(props: &BuildProperties) -> Option<String> {
    props
        .configuration()
        .map(|configuration| format!("WebKitBuild/{configuration}.zip"))
}

fn built_product_location(ctx: &mut StepContext<'_>) -> Option<(String, ArtifactKey)> {
    let located = built_product_path(ctx.properties).zip(ArtifactKey::built_product(ctx.properties));
    if located.is_none() {
        ctx.add_log("Build is missing configuration, full platform or patch id.");
    }
    located
}

pub async fn upload_built_product(ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
    let Some((local, key)) = built_product_location(ctx) else {
        return Ok(StepOutcome::failure(StepSummary::done("Uploaded built product")));
    };
    ctx.services.artifacts.upload(&local, &key).await?;
    ctx.add_log(format!("uploaded {local} to {key}"));
    Ok(StepOutcome::success(StepSummary::done("Uploaded built product")))
}

pub async fn download_built_product(ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
    let Some((local, key)) = built_product_location(ctx) else {
        return Ok(StepOutcome::failure(StepSummary::done("Downloaded built product")));
    };
    ctx.services.artifacts.download(&key, &local).await?;
    ctx.add_log(format!("downloaded {key} to {local}"));
    Ok(StepOutcome::success(StepSummary::done("Downloaded built product")))
}

pub async fn upload_test_results(ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
    let key = ArtifactKey::test_results(ctx.properties);
    ctx.services
        .artifacts
        .upload(TEST_RESULTS_ARCHIVE, &key)
        .await?;
    ctx.add_log(format!("uploaded {TEST_RESULTS_ARCHIVE} to {key}"));
    Ok(StepOutcome::success(StepSummary::done("Uploaded test results")))
}

/// Unpack uploaded results and link to their `results.html`.
pub async fn extract_test_results(ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
    let key = ArtifactKey::test_results(ctx.properties);
    let directory = ctx.services.artifacts.extract(&key).await?;
    let url = format!(
        "{}/results.html",
        ctx.services.artifacts.public_url(&directory)
    );
    ctx.add_url("view layout test results", url);
    Ok(StepOutcome::success(StepSummary::done("Extracted test results")))
}

//! `check-patch-relevance`: skip builds whose patch touches nothing the
//! queue cares about.

use ews_domain::{BuildMessage, StepResult, StepSummary};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::StepContext;
use crate::error::{FetchError, Result};
use crate::step::StepOutcome;

const DONE: &str = "Checked patch relevance";

/// Paths that make a patch relevant to builders whose name contains `name`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Topic {
    pub name: String,
    pub paths: Vec<String>,
}

impl Topic {
    pub fn new(name: &str, paths: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            paths: paths.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Ordered topic table. The first topic contained in the builder name wins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct TopicTable {
    topics: Vec<Topic>,
}

impl TopicTable {
    pub fn new(topics: Vec<Topic>) -> Self {
        Self { topics }
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    /// Topic for a builder; `None` means every patch is relevant.
    pub fn topic_for(&self, builder_name: &str) -> Option<&Topic> {
        let builder = builder_name.to_lowercase();
        self.topics
            .iter()
            .find(|topic| builder.contains(&topic.name.to_lowercase()))
    }
}

impl Default for TopicTable {
    fn default() -> Self {
        Self::new(vec![
            Topic::new("bindings", &["Source/WebCore", "Tools"]),
            Topic::new(
                "jsc",
                &[
                    "JSTests/",
                    "Source/JavaScriptCore/",
                    "Source/WTF/",
                    "Source/bmalloc/",
                    "Makefile",
                    "Makefile.shared",
                    "Source/Makefile",
                    "Source/Makefile.shared",
                    "Tools/Scripts/build-webkit",
                    "Tools/Scripts/build-jsc",
                    "Tools/Scripts/jsc-stress-test-helpers/",
                    "Tools/Scripts/run-jsc",
                    "Tools/Scripts/run-jsc-benchmarks",
                    "Tools/Scripts/run-jsc-stress-tests",
                    "Tools/Scripts/run-javascriptcore-tests",
                    "Tools/Scripts/run-layout-jsc",
                    "Tools/Scripts/update-javascriptcore-test-results",
                    "Tools/Scripts/webkitdirs.pm",
                ],
            ),
            Topic::new(
                "webkitpy",
                &["Tools/Scripts/webkitpy/", "Tools/QueueStatusServer/"],
            ),
        ])
    }
}

enum PathMatcher {
    Pattern(Regex),
    Literal(String),
}

impl PathMatcher {
    fn new(path: &str) -> Self {
        match RegexBuilder::new(path).case_insensitive(true).build() {
            Ok(re) => PathMatcher::Pattern(re),
            Err(e) => {
                debug!(path = %path, error = %e, "topic path is not a valid pattern, matching literally");
                PathMatcher::Literal(path.to_lowercase())
            }
        }
    }

    fn is_match(&self, line: &str) -> bool {
        match self {
            PathMatcher::Pattern(re) => re.is_match(line),
            PathMatcher::Literal(path) => line.to_lowercase().contains(path),
        }
    }
}

/// Whether any line of `patch` mentions a path of the builder's topic.
pub fn is_relevant(patch: &str, builder_name: &str, table: &TopicTable) -> bool {
    let Some(topic) = table.topic_for(builder_name) else {
        return true;
    };
    let matchers: Vec<PathMatcher> = topic.paths.iter().map(|p| PathMatcher::new(p)).collect();
    patch
        .lines()
        .any(|line| matchers.iter().any(|m| m.is_match(line)))
}

pub async fn check_patch_relevance(
    ctx: &mut StepContext<'_>,
    table: &TopicTable,
) -> Result<StepOutcome> {
    let patch = match ctx.properties.patch_id {
        None => None,
        Some(patch_id) => match ctx.services.patches.get_patch(patch_id).await {
            Ok(diff) => Some(diff),
            Err(FetchError::NotFound { .. }) => None,
            Err(e) => {
                ctx.add_log(format!("Unable to fetch patch {patch_id}: {e}"));
                return Ok(StepOutcome::new(StepResult::Warnings, StepSummary::done(DONE)));
            }
        },
    };

    let Some(patch) = patch.filter(|p| !p.is_empty()) else {
        ctx.add_log("This build doesn't have a patch, it might be a force build.");
        return Ok(StepOutcome::success(StepSummary::done(DONE)));
    };

    if is_relevant(&patch, &ctx.properties.builder_name, table) {
        ctx.add_log("This patch contains relevant changes.");
        return Ok(StepOutcome::success(StepSummary::done(DONE)));
    }

    ctx.add_log("This patch does not have relevant changes.");
    Ok(
        StepOutcome::failure(StepSummary::done(DONE)).finish_build(
            StepResult::Skipped,
            BuildMessage::IrrelevantPatch {
                patch_id: ctx.properties.patch_id,
            },
        ),
    )
}

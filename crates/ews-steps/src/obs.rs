//! Structured lifecycle events for builds and steps.
//!
//! Every event carries an `event = "..."` field so log pipelines can filter
//! on it. Set `RUST_LOG=ews_steps=debug` to also see condition-skipped steps.

use ews_domain::{BuildId, BuildMessage, StepResult};
use tracing::{debug, info, warn};

/// Span that tags everything logged during a build with its id and builder.
///
/// Attach it with `tracing::Instrument` so the build future stays `Send`.
pub fn build_span(build_id: &BuildId, builder_name: &str) -> tracing::Span {
    tracing::info_span!("ews.build", build_id = %build_id, builder = %builder_name)
}

pub fn emit_build_started(build_id: &BuildId, builder_name: &str, step_count: usize) {
    info!(
        event = "build.started",
        build_id = %build_id,
        builder = %builder_name,
        step_count = step_count,
    );
}

pub fn emit_step_started(step_name: &str) {
    info!(event = "step.started", step = %step_name);
}

pub fn emit_step_finished(step_name: &str, result: StepResult, duration_ms: u64) {
    info!(
        event = "step.finished",
        step = %step_name,
        result = %result,
        duration_ms = duration_ms,
    );
}

/// A step's run condition was false.
pub fn emit_step_skipped(step_name: &str) {
    debug!(event = "step.skipped", step = %step_name);
}

/// A step returned an error instead of an outcome.
pub fn emit_step_exception(step_name: &str, error: &dyn std::fmt::Display) {
    warn!(event = "step.exception", step = %step_name, error = %error);
}

/// A step was never dispatched because the build already ended.
pub fn emit_step_not_run(step_name: &str) {
    debug!(event = "step.not_run", step = %step_name);
}

pub fn emit_build_cancelled(build_id: &BuildId) {
    warn!(event = "build.cancelled", build_id = %build_id);
}

pub fn emit_build_finished(
    build_id: &BuildId,
    result: StepResult,
    message: &BuildMessage,
    duration_ms: u64,
) {
    info!(
        event = "build.finished",
        build_id = %build_id,
        result = %result,
        message = %message,
        duration_ms = duration_ms,
    );
}

//! Sequential step engine.
//!
//! Runs a build's steps in order against shared [`BuildProperties`],
//! aggregates results with buildbot semantics and reports every step and
//! the terminal outcome to the [`BuildReporter`](crate::services::BuildReporter).

use std::time::{Duration, Instant};

use chrono::Utc;
use ews_domain::{
    BuildId, BuildMessage, BuildProperties, BuildReport, StepRecord, StepResult, StepSummary,
    StepUrl,
};
use tracing::Instrument;

use crate::error::Result;
use crate::metrics::METRICS;
use crate::obs;
use crate::services::{CancelToken, CommandOutput, CommandSpec, Services};
use crate::step::{pipeline_digest, Step, StepKind, StepOutcome};
use crate::{analyze, checkout, compile, configure, relevance, test_runs, transfer, validate};

/// Per-step view of the build handed to step implementations.
pub struct StepContext<'a> {
    pub build_id: BuildId,
    pub step_name: &'a str,
    pub timeout: Option<Duration>,
    pub properties: &'a mut BuildProperties,
    pub services: &'a Services,
    log: String,
    urls: Vec<StepUrl>,
}

impl<'a> StepContext<'a> {
    pub fn new(
        build_id: BuildId,
        step_name: &'a str,
        timeout: Option<Duration>,
        properties: &'a mut BuildProperties,
        services: &'a Services,
    ) -> Self {
        Self {
            build_id,
            step_name,
            timeout,
            properties,
            services,
            log: String::new(),
            urls: Vec::new(),
        }
    }

    /// Append a line to the step log.
    pub fn add_log(&mut self, line: impl AsRef<str>) {
        self.log.push_str(line.as_ref());
        if !self.log.ends_with('\n') {
            self.log.push('\n');
        }
    }

    pub fn add_url(&mut self, name: impl Into<String>, url: impl Into<String>) {
        self.urls.push(StepUrl {
            name: name.into(),
            url: url.into(),
        });
    }

    pub fn log(&self) -> &str {
        &self.log
    }

    /// Run a command on the worker, applying the step timeout unless the
    /// command sets its own, and capture its output in the step log.
    pub async fn run_command(&mut self, mut spec: CommandSpec) -> Result<CommandOutput> {
        if spec.timeout.is_none() {
            spec.timeout = self.timeout;
        }
        self.add_log(format!("$ {spec}"));
        let output = self.services.runner.run(&spec).await?;
        if !output.stdout.is_empty() {
            self.add_log(&output.stdout);
        }
        if !output.stderr.is_empty() {
            self.add_log(&output.stderr);
        }
        if output.timed_out {
            self.add_log(format!(
                "command timed out after {}s",
                spec.timeout.map(|t| t.as_secs()).unwrap_or_default()
            ));
        }
        self.add_log(format!("exit code {}", output.exit_code));
        Ok(output)
    }

    /// Persist the command's JSON results file under this step's name.
    pub async fn store_results(&mut self, output: &CommandOutput) -> Result<()> {
        match &output.logfile {
            Some(json) => {
                self.services
                    .results
                    .put(&self.build_id, self.step_name, json)
                    .await
            }
            None => {
                self.add_log("no JSON results were produced");
                Ok(())
            }
        }
    }

    fn into_parts(self) -> (String, Vec<StepUrl>) {
        (self.log, self.urls)
    }
}

/// A build waiting to run.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub build_id: BuildId,
    pub properties: BuildProperties,
}

impl BuildRequest {
    pub fn new(properties: BuildProperties) -> Self {
        Self {
            build_id: BuildId::new(),
            properties,
        }
    }
}

/// Drives builds through their steps.
#[derive(Clone)]
pub struct StepEngine {
    services: Services,
}

impl StepEngine {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Run `steps` in order until one halts, finishes the build, or the
    /// token is cancelled.
    ///
    /// Errors are only returned when the reporter cannot be reached; step
    /// failures of any kind end up in the report.
    pub async fn run(
        &self,
        request: BuildRequest,
        steps: Vec<Step>,
        cancel: &CancelToken,
    ) -> Result<BuildReport> {
        let span = obs::build_span(&request.build_id, &request.properties.builder_name);
        self.run_steps(request, steps, cancel).instrument(span).await
    }

    async fn run_steps(
        &self,
        request: BuildRequest,
        steps: Vec<Step>,
        cancel: &CancelToken,
    ) -> Result<BuildReport> {
        let start = Instant::now();
        let BuildRequest {
            build_id,
            mut properties,
        } = request;
        let digest = pipeline_digest(&steps);
        let reporter = &self.services.reporter;

        obs::emit_build_started(&build_id, &properties.builder_name, steps.len());
        METRICS.inc_builds_started();

        let mut records = Vec::with_capacity(steps.len());
        let mut result = StepResult::Success;
        let mut failed_steps = Vec::new();
        let mut terminal: Option<(StepResult, BuildMessage)> = None;
        let mut remaining = steps.iter();

        for step in remaining.by_ref() {
            if cancel.is_cancelled() {
                obs::emit_build_cancelled(&build_id);
                terminal = Some((StepResult::Exception, BuildMessage::Cancelled));
                obs::emit_step_not_run(&step.name);
                break;
            }

            if !step.run_if.should_run(&properties) {
                obs::emit_step_skipped(&step.name);
                let record = StepRecord {
                    name: step.name.clone(),
                    result: StepResult::Skipped,
                    summary: StepSummary::done(step.name.clone()),
                    urls: Vec::new(),
                    hidden: true,
                    log: String::new(),
                    started_at: Utc::now(),
                    duration_ms: 0,
                };
                reporter.report_step_result(&build_id, &record).await?;
                records.push(record);
                continue;
            }

            obs::emit_step_started(&step.name);
            let started_at = Utc::now();
            let step_start = Instant::now();

            let mut ctx = StepContext::new(
                build_id,
                &step.name,
                step.timeout,
                &mut properties,
                &self.services,
            );
            let outcome = match execute(&step.kind, &mut ctx).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    obs::emit_step_exception(&step.name, &e);
                    ctx.add_log(format!("step raised an exception: {e}"));
                    StepOutcome::new(StepResult::Exception, StepSummary::done(step.name.clone()))
                }
            };
            let (log, urls) = ctx.into_parts();

            let duration_ms = step_start.elapsed().as_millis() as u64;
            obs::emit_step_finished(&step.name, outcome.result, duration_ms);
            METRICS.inc_steps_executed();

            let record = StepRecord {
                name: step.name.clone(),
                result: outcome.result,
                summary: outcome.summary,
                urls,
                hidden: false,
                log,
                started_at,
                duration_ms,
            };
            reporter.report_step_result(&build_id, &record).await?;
            records.push(record);

            if let Some(contribution) = step.policy.contribution(outcome.result) {
                result = result.worst(contribution);
                if contribution == StepResult::Failure {
                    failed_steps.push(step.name.clone());
                }
            }

            if let Some(finish) = outcome.finish {
                terminal = Some((finish.result, finish.message));
                break;
            }
            if step.policy.halts(outcome.result) {
                terminal = Some((
                    result,
                    BuildMessage::StepFailed {
                        step: step.name.clone(),
                    },
                ));
                break;
            }
        }

        for step in remaining {
            obs::emit_step_not_run(&step.name);
        }

        let (result, message) =
            terminal.unwrap_or((result, BuildMessage::Completed { failed_steps }));
        let duration_ms = start.elapsed().as_millis() as u64;

        reporter
            .report_build_finished(&build_id, &message, result)
            .await?;
        obs::emit_build_finished(&build_id, result, &message, duration_ms);
        if result == StepResult::Skipped {
            METRICS.inc_builds_skipped();
        }

        Ok(BuildReport {
            build_id,
            pipeline_digest: digest,
            properties,
            steps: records,
            result,
            message,
            duration_ms,
        })
    }
}

async fn execute(kind: &StepKind, ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
    match kind {
        StepKind::ConfigureBuild(config) => configure::configure_build(ctx, config).await,
        StepKind::PrintConfiguration => configure::print_configuration(ctx).await,
        StepKind::CheckPatchRelevance(topics) => {
            relevance::check_patch_relevance(ctx, topics).await
        }
        StepKind::ValidatePatch => validate::validate_patch(ctx).await,
        StepKind::CheckOutSource(config) => checkout::check_out_source(ctx, config).await,
        StepKind::ApplyPatch => checkout::apply_patch(ctx).await,
        StepKind::Shell(shell) => test_runs::run_shell(ctx, shell).await,
        StepKind::CheckStyle => test_runs::check_style(ctx).await,
        StepKind::Compile { target, tree } => compile::compile(ctx, *target, *tree).await,
        StepKind::RunJscTests(run) => test_runs::run_jsc_tests(ctx, *run).await,
        StepKind::RunApiTests(run) => test_runs::run_api_tests(ctx, *run).await,
        StepKind::AnalyzeApiTests => analyze::analyze_api_tests(ctx).await,
        StepKind::RunLayoutTests { webkit1 } => test_runs::run_layout_tests(ctx, *webkit1).await,
        StepKind::UploadBuiltProduct => transfer::upload_built_product(ctx).await,
        StepKind::DownloadBuiltProduct => transfer::download_built_product(ctx).await,
        StepKind::UploadTestResults => transfer::upload_test_results(ctx).await,
        StepKind::ExtractTestResults => transfer::extract_test_results(ctx).await,
    }
}

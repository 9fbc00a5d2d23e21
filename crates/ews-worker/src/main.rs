//! EWS worker - runs patch-validation pipelines on this machine
//!
//! ## Commands
//!
//! - `run`: build one or more patches on a configured queue
//! - `steps`: show the ordered steps of a queue
//! - `factories`: list the queue kinds
//! - `relevance`: check a diff against a queue's relevance topic
//! - `analyze`: compare three API test result files

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ews_domain::{BuildProperties, BuildReport, StepResult, TestRunResult};
use ews_steps::relevance::is_relevant;
use ews_steps::step::pipeline_digest;
use ews_steps::{
    disambiguate, BugzillaClient, BuildRequest, CancelToken, Factory, FsArtifactTransfer,
    FsResultStore, LocalCommandRunner, LogReporter, PatchSource, ResultStore, Services,
    StepEngine, Verdict, METRICS,
};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

mod config;

use config::WorkerConfig;

#[derive(Parser)]
#[command(name = "ews-worker")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Early-warning patch validation worker", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Worker configuration file
    #[arg(short, long, global = true, env = "EWS_CONFIG", default_value = "ews.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build patches on a configured queue; several patches build concurrently
    Run {
        /// Builder name from the config file
        #[arg(short, long)]
        builder: String,

        /// Patch (attachment) id, repeatable
        #[arg(short, long = "patch", required = true)]
        patches: Vec<u64>,

        /// Bug id, when known up front
        #[arg(long)]
        bug: Option<u64>,

        /// Build number of the first build
        #[arg(long, default_value = "1")]
        build_number: u64,

        /// Directory for JSON build reports
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },

    /// Show the ordered steps of a configured queue
    Steps {
        /// Builder name from the config file
        #[arg(short, long)]
        builder: String,
    },

    /// List queue kinds
    Factories,

    /// Check whether a diff touches a builder's relevance topic
    Relevance {
        /// Builder name (the topic is matched against it)
        #[arg(short, long)]
        builder: String,

        /// Diff file
        diff: PathBuf,
    },

    /// Classify API test failures from first run, rerun and clean-tree results
    Analyze {
        first: PathBuf,
        second: PathBuf,
        clean: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    ews_steps::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            builder,
            patches,
            bug,
            build_number,
            report_dir,
        } => {
            let config = WorkerConfig::load(&cli.config)?;
            cmd_run(
                &config,
                &builder,
                &patches,
                bug,
                build_number,
                report_dir.as_deref(),
            )
            .await
        }
        Commands::Steps { builder } => {
            let config = WorkerConfig::load(&cli.config)?;
            cmd_steps(&config, &builder)
        }
        Commands::Factories => cmd_factories(),
        Commands::Relevance { builder, diff } => {
            let config = if cli.config.exists() {
                WorkerConfig::load(&cli.config)?
            } else {
                WorkerConfig::default()
            };
            cmd_relevance(&config, &builder, &diff)
        }
        Commands::Analyze {
            first,
            second,
            clean,
        } => cmd_analyze(&first, &second, &clean),
    }
}

/// Collaborators for one build, in its own working directory.
fn build_services(
    config: &WorkerConfig,
    builder: &str,
    patch_id: u64,
    patches: Arc<dyn PatchSource>,
    results: Arc<dyn ResultStore>,
) -> Result<Services> {
    let workdir = config.workdir.join(format!("{builder}-{patch_id}"));
    std::fs::create_dir_all(&workdir)
        .with_context(|| format!("Failed to create {}", workdir.display()))?;
    Ok(Services {
        runner: Arc::new(LocalCommandRunner::new(workdir.clone())),
        patches,
        results,
        artifacts: Arc::new(FsArtifactTransfer::new(workdir, &config.storage)),
        reporter: Arc::new(LogReporter),
    })
}

/// Build each patch on `builder`
async fn cmd_run(
    config: &WorkerConfig,
    builder: &str,
    patch_ids: &[u64],
    bug_id: Option<u64>,
    first_build_number: u64,
    report_dir: Option<&Path>,
) -> Result<()> {
    let queue = config.builder(builder)?;
    let build_config = queue.build_configuration();
    let options = config.factory_options();

    let patches: Arc<dyn PatchSource> = Arc::new(
        BugzillaClient::new(&config.bug_tracker).context("Failed to create bug tracker client")?,
    );
    let results: Arc<dyn ResultStore> = Arc::new(
        FsResultStore::new(&config.storage.root).context("Failed to open result store")?,
    );

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling builds after their current step");
            on_interrupt.cancel();
        }
    });

    let mut builds = Vec::with_capacity(patch_ids.len());
    for (build_number, &patch_id) in (first_build_number..).zip(patch_ids) {
        let services = build_services(config, builder, patch_id, patches.clone(), results.clone())?;
        let mut properties = BuildProperties::new(builder, build_number).with_patch(patch_id);
        if let Some(bug_id) = bug_id {
            properties = properties.with_bug(bug_id);
        }
        let steps = queue.factory.steps(&build_config, &options);
        let cancel = &cancel;
        builds.push(async move {
            StepEngine::new(services)
                .run(BuildRequest::new(properties), steps, cancel)
                .await
        });
    }

    let mut failed = 0;
    let mut skipped = 0;
    for report in join_all(builds).await {
        let report = report.context("Build aborted")?;
        print_report(&report);
        if let Some(dir) = report_dir {
            write_report(dir, &report)?;
        }
        match classify(report.result) {
            BuildVerdict::Passed => {}
            BuildVerdict::Skipped => skipped += 1,
            BuildVerdict::Failed => failed += 1,
        }
    }

    METRICS.flush();
    if skipped > 0 {
        println!("{skipped} of {} builds skipped", patch_ids.len());
    }
    if failed > 0 {
        bail!("{failed} of {} builds did not pass", patch_ids.len());
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildVerdict {
    Passed,
    /// Disqualified patch (irrelevant, closed bug, obsolete or r-); not a failure.
    Skipped,
    Failed,
}

fn classify(result: StepResult) -> BuildVerdict {
    match result {
        StepResult::Success | StepResult::Warnings => BuildVerdict::Passed,
        StepResult::Skipped => BuildVerdict::Skipped,
        StepResult::Failure | StepResult::Exception | StepResult::Retry => BuildVerdict::Failed,
    }
}

fn print_report(report: &BuildReport) {
    let patch = report
        .properties
        .patch_id
        .map(|id| id.to_string())
        .unwrap_or_default();
    println!(
        "{} patch {}: {} ({})",
        report.properties.builder_name, patch, report.result, report.message
    );
    for step in report.executed_steps() {
        let status = if step.result.is_success() { "✓" } else { "✗" };
        println!(
            "  {} {} - {} ({}ms)",
            status,
            step.name,
            step.summary_line(),
            step.duration_ms
        );
    }
}

fn write_report(dir: &Path, report: &BuildReport) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(format!("{}.json", report.build_id));
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "wrote build report");
    Ok(path)
}

/// Print the steps of a queue and its pipeline digest
fn cmd_steps(config: &WorkerConfig, builder: &str) -> Result<()> {
    let queue = config.builder(builder)?;
    let steps = queue
        .factory
        .steps(&queue.build_configuration(), &config.factory_options());

    println!("{} ({})", queue.name, queue.factory);
    for (i, step) in steps.iter().enumerate() {
        let mut notes = Vec::new();
        if step.policy.halt_on_failure {
            notes.push("halts");
        }
        if !step.policy.flunk_on_failure {
            notes.push("does not flunk");
        }
        if !matches!(step.run_if, ews_steps::RunCondition::Always) {
            notes.push("conditional");
        }
        if notes.is_empty() {
            println!("  {:>2}. {}", i + 1, step.name);
        } else {
            println!("  {:>2}. {} [{}]", i + 1, step.name, notes.join(", "));
        }
    }
    println!("Digest: {}", pipeline_digest(&steps));
    Ok(())
}

fn cmd_factories() -> Result<()> {
    for factory in Factory::ALL {
        println!("{factory}");
    }
    Ok(())
}

fn cmd_relevance(config: &WorkerConfig, builder: &str, diff: &Path) -> Result<()> {
    let patch = std::fs::read_to_string(diff)
        .with_context(|| format!("Failed to read diff {}", diff.display()))?;
    let topics = config.factory_options().topics;
    if is_relevant(&patch, builder, &topics) {
        println!("relevant");
    } else {
        println!("not relevant");
    }
    Ok(())
}

/// Results of one run; unreadable or malformed files count as missing.
fn read_results(path: &Path) -> Option<TestRunResult> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unable to read results");
            return None;
        }
    };
    match TestRunResult::from_json(&text) {
        Ok(results) => Some(results),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unable to parse results");
            None
        }
    }
}

fn analyze_files(first: &Path, second: &Path, clean: &Path) -> Verdict {
    disambiguate(
        read_results(first).as_ref(),
        read_results(second).as_ref(),
        read_results(clean).as_ref(),
    )
}

fn cmd_analyze(first: &Path, second: &Path, clean: &Path) -> Result<()> {
    let verdict = analyze_files(first, second, clean);
    println!("{}: {}", verdict.result(), verdict.message());
    Ok(())
}

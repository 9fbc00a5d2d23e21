//! Interfaces of the collaborators a build calls into.
//!
//! The engine never talks to processes, the bug tracker, storage or the
//! controller directly; each build receives a [`Services`] bundle instead.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ews_domain::{
    BugMetadata, BuildId, BuildMessage, BuildProperties, PatchMetadata, StepRecord, StepResult,
};
use tracing::info;

use crate::error::{FetchError, Result};

// ---------------------------------------------------------------------------
// Process execution
// ---------------------------------------------------------------------------

/// A command to run on the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// First element is the executable.
    pub argv: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
    /// File the command writes (relative to the working directory) whose
    /// contents are collected after the command exits.
    pub logfile: Option<String>,
}

impl CommandSpec {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            env: BTreeMap::new(),
            timeout: None,
            logfile: None,
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn logfile(mut self, path: impl Into<String>) -> Self {
        self.logfile = Some(path.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv.join(" "))
    }
}

/// Captured result of a command. Output is kept even when the command timed out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, -1 when killed or terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration_ms: u64,
    /// Contents of [`CommandSpec::logfile`], if the command produced it.
    pub logfile: Option<String>,
}

impl CommandOutput {
    /// Output of a command that exited with `exit_code` and printed nothing.
    pub fn exited(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Self::default()
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn with_logfile(mut self, contents: impl Into<String>) -> Self {
        self.logfile = Some(contents.into());
        self
    }

    pub fn did_fail(&self) -> bool {
        self.timed_out || self.exit_code != 0
    }

    /// stdout followed by stderr, the text log observers look at.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Runs commands and places files in the worker's working directory.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Write `contents` to `path`, relative to the working directory.
    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Bug tracker
// ---------------------------------------------------------------------------

/// Patch content and bug-tracker metadata.
#[async_trait]
pub trait PatchSource: Send + Sync {
    /// Raw diff of a patch.
    async fn get_patch(&self, patch_id: u64) -> std::result::Result<String, FetchError>;

    async fn get_patch_metadata(
        &self,
        patch_id: u64,
    ) -> std::result::Result<PatchMetadata, FetchError>;

    async fn get_bug_metadata(&self, bug_id: u64) -> std::result::Result<BugMetadata, FetchError>;

    /// Human-facing page of a patch.
    fn patch_url(&self, patch_id: u64) -> String;

    /// Human-facing page of a bug.
    fn bug_url(&self, bug_id: u64) -> String;
}

// ---------------------------------------------------------------------------
// Structured test results
// ---------------------------------------------------------------------------

/// Named JSON blobs produced by test steps, addressable by step name within a build.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn put(&self, build_id: &BuildId, step_name: &str, json: &str) -> Result<()>;

    async fn get(&self, build_id: &BuildId, step_name: &str) -> Result<Option<String>>;
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// Location of an artifact in controller storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey(String);

impl ArtifactKey {
    pub fn new(key: impl Into<String>) -> Self {
        ArtifactKey(key.into())
    }

    /// `archives/<fullPlatform>-<architecture>-<configuration>/<patch_id>.zip`
    pub fn built_product(props: &BuildProperties) -> Option<Self> {
        let full_platform = props.full_platform()?;
        let configuration = props.configuration()?;
        let patch_id = props.patch_id?;
        let queue = match props.architecture() {
            Some(arch) => format!("{full_platform}-{arch}-{configuration}"),
            None => format!("{full_platform}-{configuration}"),
        };
        Some(ArtifactKey(format!("archives/{queue}/{patch_id}.zip")))
    }

    /// `results/<builder>/r<patch_id>-<build_number>.zip`
    pub fn test_results(props: &BuildProperties) -> Self {
        let patch = props.patch_id.map(|id| id.to_string()).unwrap_or_default();
        ArtifactKey(format!(
            "results/{}/r{}-{}.zip",
            props.builder_name, patch, props.build_number
        ))
    }

    /// Key of the directory an archive extracts into.
    pub fn directory(&self) -> Self {
        ArtifactKey(self.0.trim_end_matches(".zip").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Moves build products and result archives between worker and controller storage.
#[async_trait]
pub trait ArtifactTransfer: Send + Sync {
    async fn upload(&self, local_path: &str, key: &ArtifactKey) -> Result<()>;

    async fn download(&self, key: &ArtifactKey, local_path: &str) -> Result<()>;

    /// Unpack an archive in storage; returns the key of the extracted directory.
    async fn extract(&self, key: &ArtifactKey) -> Result<ArtifactKey>;

    fn public_url(&self, key: &ArtifactKey) -> String;
}

// ---------------------------------------------------------------------------
// Outcome sink
// ---------------------------------------------------------------------------

/// Receives step results and the terminal build outcome.
#[async_trait]
pub trait BuildReporter: Send + Sync {
    async fn report_step_result(&self, build_id: &BuildId, record: &StepRecord) -> Result<()>;

    async fn report_build_finished(
        &self,
        build_id: &BuildId,
        message: &BuildMessage,
        result: StepResult,
    ) -> Result<()>;
}

/// Reporter that writes outcomes to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

#[async_trait]
impl BuildReporter for LogReporter {
    async fn report_step_result(&self, build_id: &BuildId, record: &StepRecord) -> Result<()> {
        if !record.hidden {
            info!(
                build_id = %build_id,
                step = %record.name,
                result = %record.result,
                "{}",
                record.summary_line()
            );
        }
        Ok(())
    }

    async fn report_build_finished(
        &self,
        build_id: &BuildId,
        message: &BuildMessage,
        result: StepResult,
    ) -> Result<()> {
        info!(build_id = %build_id, result = %result, "{}", message);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// Collaborators available to every step of a build.
#[derive(Clone)]
pub struct Services {
    pub runner: Arc<dyn CommandRunner>,
    pub patches: Arc<dyn PatchSource>,
    pub results: Arc<dyn ResultStore>,
    pub artifacts: Arc<dyn ArtifactTransfer>,
    pub reporter: Arc<dyn BuildReporter>,
}

/// Cooperative cancellation flag, checked before each step is dispatched.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ews_domain::{BuildConfiguration, Configuration};

    fn configured(arch: Option<&str>) -> BuildProperties {
        let mut config = BuildConfiguration::new("mac-mojave", Some(Configuration::Release));
        if let Some(arch) = arch {
            config = config.with_architectures(vec![arch.to_string()]);
        }
        let mut props = BuildProperties::new("macOS-Mojave-Release-WK2-Tests-EWS", 31).with_patch(9);
        props.apply_configuration(&config).unwrap();
        props
    }

    #[test]
    fn test_built_product_key() {
        let key = ArtifactKey::built_product(&configured(Some("x86_64"))).unwrap();
        assert_eq!(key.as_str(), "archives/mac-mojave-x86_64-release/9.zip");

        let key = ArtifactKey::built_product(&configured(None)).unwrap();
        assert_eq!(key.as_str(), "archives/mac-mojave-release/9.zip");
    }

    #[test]
    fn test_built_product_key_requires_patch() {
        let mut props = configured(None);
        props.patch_id = None;
        assert!(ArtifactKey::built_product(&props).is_none());
    }

    #[test]
    fn test_test_results_key() {
        let key = ArtifactKey::test_results(&configured(None));
        assert_eq!(key.as_str(), "results/macOS-Mojave-Release-WK2-Tests-EWS/r9-31.zip");
        assert_eq!(
            key.directory().as_str(),
            "results/macOS-Mojave-Release-WK2-Tests-EWS/r9-31"
        );
    }

    #[test]
    fn test_command_output_did_fail() {
        let ok = CommandOutput::default();
        assert!(!ok.did_fail());

        let timed_out = CommandOutput {
            timed_out: true,
            ..CommandOutput::default()
        };
        assert!(timed_out.did_fail());

        let failed = CommandOutput {
            exit_code: 2,
            ..CommandOutput::default()
        };
        assert!(failed.did_fail());
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_command_spec_display() {
        let spec = CommandSpec::new(vec!["git".to_string(), "fetch".to_string()])
            .env("MFLAGS", "")
            .timeout(Duration::from_secs(5));
        assert_eq!(spec.to_string(), "git fetch");
        assert_eq!(spec.env.get("MFLAGS").map(String::as_str), Some(""));
    }
}

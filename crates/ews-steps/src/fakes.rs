//! In-memory fakes for the collaborator traits (testing only).
//!
//! Provides `ScriptedRunner`, `MemoryPatchSource`, `MemoryResultStore`,
//! `MemoryArtifactTransfer` and `MemoryReporter`, plus [`FakeServices`]
//! which bundles them into a [`Services`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ews_domain::{BugMetadata, BuildId, BuildMessage, PatchMetadata, StepRecord, StepResult};

use crate::error::{FetchError, Result, StepError};
use crate::services::{
    ArtifactKey, ArtifactTransfer, BuildReporter, CommandOutput, CommandRunner, CommandSpec,
    PatchSource, ResultStore, Services,
};

// ---------------------------------------------------------------------------
// ScriptedRunner
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Rule {
    needle: String,
    outputs: VecDeque<CommandOutput>,
}

/// Command runner answering from a script instead of spawning processes.
///
/// A rule matches when its needle occurs in the rendered command line; the
/// first matching rule answers. Successive calls consume the rule's outputs
/// and the last one repeats. Unmatched commands succeed silently.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<CommandSpec>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, needle: &str, outputs: Vec<CommandOutput>) -> Self {
        self.rules.lock().unwrap().push(Rule {
            needle: needle.to_string(),
            outputs: outputs.into(),
        });
        self
    }

    /// Every command run so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of commands whose command line contains `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|spec| spec.to_string().contains(needle))
            .count()
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        if spec.argv.is_empty() {
            return Err(StepError::EmptyCommand);
        }
        self.calls.lock().unwrap().push(spec.clone());

        let line = spec.to_string();
        let mut rules = self.rules.lock().unwrap();
        let mut output = match rules.iter_mut().find(|rule| line.contains(&rule.needle)) {
            Some(rule) if rule.outputs.len() > 1 => rule.outputs.pop_front().unwrap_or_default(),
            Some(rule) => rule.outputs.front().cloned().unwrap_or_default(),
            None => CommandOutput::default(),
        };
        if spec.logfile.is_none() {
            output.logfile = None;
        }
        Ok(output)
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), contents.to_vec());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryPatchSource
// ---------------------------------------------------------------------------

/// Bug tracker backed by maps. Unknown ids answer `NotFound`.
#[derive(Debug, Default)]
pub struct MemoryPatchSource {
    diffs: Mutex<HashMap<u64, std::result::Result<String, FetchError>>>,
    patches: Mutex<HashMap<u64, std::result::Result<PatchMetadata, FetchError>>>,
    bugs: Mutex<HashMap<u64, std::result::Result<BugMetadata, FetchError>>>,
}

impl MemoryPatchSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_diff(self, patch_id: u64, diff: &str) -> Self {
        self.diffs
            .lock()
            .unwrap()
            .insert(patch_id, Ok(diff.to_string()));
        self
    }

    pub fn with_diff_error(self, patch_id: u64, error: FetchError) -> Self {
        self.diffs.lock().unwrap().insert(patch_id, Err(error));
        self
    }

    pub fn with_patch(self, patch: PatchMetadata) -> Self {
        self.patches.lock().unwrap().insert(patch.id, Ok(patch));
        self
    }

    /// Answer metadata requests for `patch_id` with `patch`, whatever its own id.
    pub fn with_patch_as(self, patch_id: u64, patch: PatchMetadata) -> Self {
        self.patches.lock().unwrap().insert(patch_id, Ok(patch));
        self
    }

    pub fn with_patch_error(self, patch_id: u64, error: FetchError) -> Self {
        self.patches.lock().unwrap().insert(patch_id, Err(error));
        self
    }

    pub fn with_bug(self, bug: BugMetadata) -> Self {
        self.bugs.lock().unwrap().insert(bug.id, Ok(bug));
        self
    }

    pub fn with_bug_error(self, bug_id: u64, error: FetchError) -> Self {
        self.bugs.lock().unwrap().insert(bug_id, Err(error));
        self
    }
}

fn not_found(what: String) -> FetchError {
    FetchError::NotFound { what }
}

#[async_trait]
impl PatchSource for MemoryPatchSource {
    async fn get_patch(&self, patch_id: u64) -> std::result::Result<String, FetchError> {
        self.diffs
            .lock()
            .unwrap()
            .get(&patch_id)
            .cloned()
            .unwrap_or_else(|| Err(not_found(format!("patch {patch_id}"))))
    }

    async fn get_patch_metadata(
        &self,
        patch_id: u64,
    ) -> std::result::Result<PatchMetadata, FetchError> {
        self.patches
            .lock()
            .unwrap()
            .get(&patch_id)
            .cloned()
            .unwrap_or_else(|| Err(not_found(format!("patch {patch_id}"))))
    }

    async fn get_bug_metadata(&self, bug_id: u64) -> std::result::Result<BugMetadata, FetchError> {
        self.bugs
            .lock()
            .unwrap()
            .get(&bug_id)
            .cloned()
            .unwrap_or_else(|| Err(not_found(format!("bug {bug_id}"))))
    }

    fn patch_url(&self, patch_id: u64) -> String {
        format!("https://bugs.example.org/attachment.cgi?id={patch_id}")
    }

    fn bug_url(&self, bug_id: u64) -> String {
        format!("https://bugs.example.org/show_bug.cgi?id={bug_id}")
    }
}

// ---------------------------------------------------------------------------
// MemoryResultStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryResultStore {
    blobs: Mutex<HashMap<(BuildId, String), String>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn put(&self, build_id: &BuildId, step_name: &str, json: &str) -> Result<()> {
        self.blobs
            .lock()
            .unwrap()
            .insert((*build_id, step_name.to_string()), json.to_string());
        Ok(())
    }

    async fn get(&self, build_id: &BuildId, step_name: &str) -> Result<Option<String>> {
        Ok(self
            .blobs
            .lock()
            .unwrap()
            .get(&(*build_id, step_name.to_string()))
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// MemoryArtifactTransfer
// ---------------------------------------------------------------------------

/// Artifact storage as a map from key to the local path it was uploaded from.
#[derive(Debug, Default)]
pub struct MemoryArtifactTransfer {
    stored: Mutex<HashMap<ArtifactKey, String>>,
    extracted: Mutex<Vec<ArtifactKey>>,
}

impl MemoryArtifactTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artifact(self, key: &str) -> Self {
        self.stored
            .lock()
            .unwrap()
            .insert(ArtifactKey::new(key), String::new());
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.stored
            .lock()
            .unwrap()
            .contains_key(&ArtifactKey::new(key))
    }

    pub fn extracted(&self) -> Vec<ArtifactKey> {
        self.extracted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactTransfer for MemoryArtifactTransfer {
    async fn upload(&self, local_path: &str, key: &ArtifactKey) -> Result<()> {
        self.stored
            .lock()
            .unwrap()
            .insert(key.clone(), local_path.to_string());
        Ok(())
    }

    async fn download(&self, key: &ArtifactKey, _local_path: &str) -> Result<()> {
        if self.stored.lock().unwrap().contains_key(key) {
            Ok(())
        } else {
            Err(StepError::Transfer(format!("{key} not found")))
        }
    }

    async fn extract(&self, key: &ArtifactKey) -> Result<ArtifactKey> {
        if !self.stored.lock().unwrap().contains_key(key) {
            return Err(StepError::Transfer(format!("{key} not found")));
        }
        self.extracted.lock().unwrap().push(key.clone());
        Ok(key.directory())
    }

    fn public_url(&self, key: &ArtifactKey) -> String {
        format!("https://ews.example.org/{key}")
    }
}

// ---------------------------------------------------------------------------
// MemoryReporter
// ---------------------------------------------------------------------------

/// Records everything reported, in order.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    steps: Mutex<Vec<(BuildId, StepRecord)>>,
    finished: Mutex<Vec<(BuildId, BuildMessage, StepResult)>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> Vec<StepRecord> {
        self.steps
            .lock()
            .unwrap()
            .iter()
            .map(|(_, record)| record.clone())
            .collect()
    }

    pub fn finished(&self) -> Vec<(BuildId, BuildMessage, StepResult)> {
        self.finished.lock().unwrap().clone()
    }
}

#[async_trait]
impl BuildReporter for MemoryReporter {
    async fn report_step_result(&self, build_id: &BuildId, record: &StepRecord) -> Result<()> {
        self.steps
            .lock()
            .unwrap()
            .push((*build_id, record.clone()));
        Ok(())
    }

    async fn report_build_finished(
        &self,
        build_id: &BuildId,
        message: &BuildMessage,
        result: StepResult,
    ) -> Result<()> {
        self.finished
            .lock()
            .unwrap()
            .push((*build_id, message.clone(), result));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// Concrete fakes kept reachable for assertions after a build.
#[derive(Clone)]
pub struct FakeServices {
    pub runner: Arc<ScriptedRunner>,
    pub patches: Arc<MemoryPatchSource>,
    pub results: Arc<MemoryResultStore>,
    pub artifacts: Arc<MemoryArtifactTransfer>,
    pub reporter: Arc<MemoryReporter>,
}

impl FakeServices {
    pub fn new(runner: ScriptedRunner, patches: MemoryPatchSource) -> Self {
        Self {
            runner: Arc::new(runner),
            patches: Arc::new(patches),
            results: Arc::new(MemoryResultStore::new()),
            artifacts: Arc::new(MemoryArtifactTransfer::new()),
            reporter: Arc::new(MemoryReporter::new()),
        }
    }

    pub fn with_artifacts(mut self, artifacts: MemoryArtifactTransfer) -> Self {
        self.artifacts = Arc::new(artifacts);
        self
    }

    pub fn services(&self) -> Services {
        Services {
            runner: self.runner.clone(),
            patches: self.patches.clone(),
            results: self.results.clone(),
            artifacts: self.artifacts.clone(),
            reporter: self.reporter.clone(),
        }
    }
}

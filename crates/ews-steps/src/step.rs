//! Step descriptors: what a step does, how its result affects the build,
//! and when it runs.

use std::fmt;
use std::time::Duration;

use ews_domain::{BuildConfiguration, BuildMessage, BuildProperties, Flag, StepResult, StepSummary};
use sha2::{Digest, Sha256};

use crate::checkout::CheckoutConfig;
use crate::relevance::TopicTable;

/// Which tree a compile or test step works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tree {
    /// The tree with the patch applied. Failures raise flags.
    Patched,
    /// Tip of tree with the patch removed. Used to tell regressions apart
    /// from pre-existing breakage.
    TipOfTree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileTarget {
    WebKit,
    Jsc,
}

/// Position of a JavaScriptCore test run in the rerun protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JscRun {
    First,
    Rerun,
    TipOfTree,
}

/// Position of an API test run in the rerun protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiRun {
    First,
    Rerun,
    WithoutPatch,
}

/// A plain command whose exit status is the step result.
#[derive(Clone, Copy)]
pub struct ShellCommand {
    pub command: fn(&BuildProperties) -> Vec<String>,
    pub done: &'static str,
    /// JSON results file the command writes; persisted under the step name.
    pub json_output: Option<&'static str>,
}

impl fmt::Debug for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellCommand")
            .field("done", &self.done)
            .field("json_output", &self.json_output)
            .finish_non_exhaustive()
    }
}

/// What a step does.
#[derive(Debug, Clone)]
pub enum StepKind {
    ConfigureBuild(BuildConfiguration),
    PrintConfiguration,
    CheckPatchRelevance(TopicTable),
    ValidatePatch,
    CheckOutSource(CheckoutConfig),
    ApplyPatch,
    Shell(ShellCommand),
    CheckStyle,
    Compile { target: CompileTarget, tree: Tree },
    RunJscTests(JscRun),
    RunApiTests(ApiRun),
    AnalyzeApiTests,
    RunLayoutTests { webkit1: bool },
    UploadBuiltProduct,
    DownloadBuiltProduct,
    UploadTestResults,
    ExtractTestResults,
}

/// How a step's result feeds into the build result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPolicy {
    pub halt_on_failure: bool,
    pub flunk_on_failure: bool,
    pub warn_on_failure: bool,
}

impl StepPolicy {
    pub const DEFAULT: StepPolicy = StepPolicy {
        halt_on_failure: false,
        flunk_on_failure: true,
        warn_on_failure: false,
    };

    pub const HALTING: StepPolicy = StepPolicy {
        halt_on_failure: true,
        flunk_on_failure: true,
        warn_on_failure: false,
    };

    /// A failure only downgrades the build to WARNINGS.
    pub const WARN_ONLY: StepPolicy = StepPolicy {
        halt_on_failure: false,
        flunk_on_failure: false,
        warn_on_failure: true,
    };

    /// Never affects the build result.
    pub const INFORMATIONAL: StepPolicy = StepPolicy {
        halt_on_failure: false,
        flunk_on_failure: false,
        warn_on_failure: false,
    };

    /// What this step's result adds to the build result, if anything.
    pub fn contribution(&self, result: StepResult) -> Option<StepResult> {
        match result {
            StepResult::Success | StepResult::Skipped => None,
            StepResult::Warnings => Some(StepResult::Warnings),
            StepResult::Failure => {
                if self.flunk_on_failure {
                    Some(StepResult::Failure)
                } else if self.warn_on_failure {
                    Some(StepResult::Warnings)
                } else {
                    None
                }
            }
            StepResult::Exception | StepResult::Retry => Some(result),
        }
    }

    /// Whether the build stops after this result.
    pub fn halts(&self, result: StepResult) -> bool {
        match result {
            StepResult::Failure => self.halt_on_failure,
            StepResult::Exception | StepResult::Retry => true,
            _ => false,
        }
    }
}

impl Default for StepPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Predicate over build properties, evaluated just before the step would run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunCondition {
    #[default]
    Always,
    AnyFlag(Vec<Flag>),
}

impl RunCondition {
    pub fn should_run(&self, props: &BuildProperties) -> bool {
        match self {
            RunCondition::Always => true,
            RunCondition::AnyFlag(flags) => props.any_flag(flags),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Step {
    pub name: String,
    pub kind: StepKind,
    pub policy: StepPolicy,
    pub run_if: RunCondition,
    pub timeout: Option<Duration>,
}

impl Step {
    pub fn new(name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            name: name.into(),
            kind,
            policy: StepPolicy::DEFAULT,
            run_if: RunCondition::Always,
            timeout: None,
        }
    }

    pub fn policy(mut self, policy: StepPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn halt_on_failure(self) -> Self {
        self.policy(StepPolicy::HALTING)
    }

    pub fn run_if(mut self, condition: RunCondition) -> Self {
        self.run_if = condition;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Forces the build terminal right after the current step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFinish {
    pub result: StepResult,
    pub message: BuildMessage,
}

/// What a step reports back to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub result: StepResult,
    pub summary: StepSummary,
    pub finish: Option<BuildFinish>,
}

impl StepOutcome {
    pub fn new(result: StepResult, summary: StepSummary) -> Self {
        Self {
            result,
            summary,
            finish: None,
        }
    }

    pub fn success(summary: StepSummary) -> Self {
        Self::new(StepResult::Success, summary)
    }

    pub fn failure(summary: StepSummary) -> Self {
        Self::new(StepResult::Failure, summary)
    }

    pub fn finish_build(mut self, result: StepResult, message: BuildMessage) -> Self {
        self.finish = Some(BuildFinish { result, message });
        self
    }
}

/// SHA-256 over the ordered step names, hex encoded.
///
/// Two builds with the same digest were configured with the same pipeline.
pub fn pipeline_digest(steps: &[Step]) -> String {
    let mut hasher = Sha256::new();
    for step in steps {
        hasher.update(step.name.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

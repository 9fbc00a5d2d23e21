//! Build-step engine for early-warning patch validation.
//!
//! A build is an ordered list of [`Step`]s run by the [`StepEngine`] against
//! shared build properties. Steps check whether a patch is worth building,
//! compile and test it, and tell regressions apart from flaky or
//! pre-existing failures by rerunning on the patched and the clean tree.

pub mod analyze;
pub mod bugzilla;
pub mod checkout;
pub mod compile;
pub mod configure;
pub mod engine;
pub mod error;
pub mod factory;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod relevance;
pub mod runner;
pub mod services;
pub mod step;
pub mod store;
pub mod telemetry;
pub mod test_runs;
pub mod transfer;
pub mod validate;

pub use analyze::{disambiguate, FlakeAnalysis, Verdict};
pub use bugzilla::{BugTrackerConfig, BugzillaClient};
pub use checkout::CheckoutConfig;
pub use engine::{BuildRequest, StepContext, StepEngine};
pub use error::{FetchError, Result, StepError};
pub use factory::{Factory, FactoryOptions};
pub use metrics::METRICS;
pub use relevance::{Topic, TopicTable};
pub use runner::LocalCommandRunner;
pub use services::{
    ArtifactKey, ArtifactTransfer, BuildReporter, CancelToken, CommandOutput, CommandRunner,
    CommandSpec, LogReporter, PatchSource, ResultStore, Services,
};
pub use step::{RunCondition, Step, StepKind, StepOutcome, StepPolicy};
pub use store::{FsArtifactTransfer, FsResultStore, StorageConfig};
pub use telemetry::init_tracing;

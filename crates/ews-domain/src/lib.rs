//! EWS Domain Model
//!
//! Defines the objects shared by every build step:
//! - BuildConfiguration: platform, configuration and architectures of a queue
//! - BuildProperties: typed, build-scoped state that steps read and raise flags on
//! - StepResult: result codes and their aggregation order
//! - PatchMetadata / BugMetadata: what the bug tracker tells us about a patch
//! - TestRunResult: structured failures written by a test runner
//! - StepRecord / BuildReport / BuildMessage: structured outcomes, rendered on demand

pub mod config;
pub mod error;
pub mod message;
pub mod patch;
pub mod properties;
pub mod report;
pub mod result;
pub mod test_results;

pub use config::{BuildConfiguration, Configuration};
pub use error::{DomainError, Result};
pub use message::{BuildMessage, FailureUnit, StepSummary};
pub use patch::{BugMetadata, BugStatus, PatchMetadata, ReviewFlag};
pub use properties::{BuildProperties, Flag};
pub use report::{BuildId, BuildReport, StepRecord, StepUrl};
pub use result::StepResult;
pub use test_results::{FailureCategory, TestFailure, TestRunResult};

/// EWS domain version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

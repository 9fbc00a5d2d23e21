//! Patch and bug metadata as reported by the bug tracker.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Review flag name used by the bug tracker.
pub const REVIEW_FLAG: &str = "review";
/// Status of a review flag that rejects the patch (`r-`).
pub const REJECTED_STATUS: &str = "-";

/// A flag set on a patch, e.g. `review` with status `+`, `-` or `?`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewFlag {
    pub name: String,
    pub status: String,
}

/// Metadata of a patch (an attachment on a bug).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatchMetadata {
    pub id: u64,
    pub bug_id: Option<u64>,
    pub author: Option<String>,
    pub obsolete: bool,
    #[serde(default)]
    pub flags: Vec<ReviewFlag>,
}

impl PatchMetadata {
    /// Whether a reviewer marked the patch `r-`.
    pub fn is_review_rejected(&self) -> bool {
        self.flags
            .iter()
            .any(|f| f.name == REVIEW_FLAG && f.status == REJECTED_STATUS)
    }
}

/// Bug status taxonomy. Unknown statuses are kept verbatim and treated as open.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BugStatus {
    Unconfirmed,
    New,
    Assigned,
    Reopened,
    Resolved,
    Verified,
    Closed,
    Other(String),
}

impl BugStatus {
    pub fn is_closed(&self) -> bool {
        matches!(self, BugStatus::Resolved | BugStatus::Verified | BugStatus::Closed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            BugStatus::Unconfirmed => "UNCONFIRMED",
            BugStatus::New => "NEW",
            BugStatus::Assigned => "ASSIGNED",
            BugStatus::Reopened => "REOPENED",
            BugStatus::Resolved => "RESOLVED",
            BugStatus::Verified => "VERIFIED",
            BugStatus::Closed => "CLOSED",
            BugStatus::Other(s) => s,
        }
    }
}

impl From<&str> for BugStatus {
    fn from(s: &str) -> Self {
        match s {
            "UNCONFIRMED" => BugStatus::Unconfirmed,
            "NEW" => BugStatus::New,
            "ASSIGNED" => BugStatus::Assigned,
            "REOPENED" => BugStatus::Reopened,
            "RESOLVED" => BugStatus::Resolved,
            "VERIFIED" => BugStatus::Verified,
            "CLOSED" => BugStatus::Closed,
            other => BugStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for BugStatus {
    fn from(s: String) -> Self {
        BugStatus::from(s.as_str())
    }
}

impl From<BugStatus> for String {
    fn from(status: BugStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for BugStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata of a bug.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BugMetadata {
    pub id: u64,
    pub status: BugStatus,
    pub title: String,
}

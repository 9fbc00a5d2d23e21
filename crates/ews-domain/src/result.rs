//! Step and build result codes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result of a step or of a whole build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepResult {
    Success,
    Warnings,
    Failure,
    Skipped,
    Exception,
    Retry,
}

impl StepResult {
    /// Aggregation rank: the higher rank wins when results are combined.
    fn rank(&self) -> u8 {
        match self {
            StepResult::Success => 0,
            StepResult::Skipped => 1,
            StepResult::Warnings => 2,
            StepResult::Failure => 3,
            StepResult::Exception => 4,
            StepResult::Retry => 5,
        }
    }

    /// The worse of two results.
    pub fn worst(self, other: StepResult) -> StepResult {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StepResult::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepResult::Success => "success",
            StepResult::Warnings => "warnings",
            StepResult::Failure => "failure",
            StepResult::Skipped => "skipped",
            StepResult::Exception => "exception",
            StepResult::Retry => "retry",
        }
    }
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worst_ordering() {
        assert_eq!(StepResult::Success.worst(StepResult::Warnings), StepResult::Warnings);
        assert_eq!(StepResult::Failure.worst(StepResult::Warnings), StepResult::Failure);
        assert_eq!(StepResult::Skipped.worst(StepResult::Success), StepResult::Skipped);
        assert_eq!(StepResult::Failure.worst(StepResult::Exception), StepResult::Exception);
        assert_eq!(StepResult::Retry.worst(StepResult::Exception), StepResult::Retry);
    }

    #[test]
    fn test_serde_uppercase() {
        assert_eq!(serde_json::to_string(&StepResult::Retry).unwrap(), "\"RETRY\"");
        let parsed: StepResult = serde_json::from_str("\"SKIPPED\"").unwrap();
        assert_eq!(parsed, StepResult::Skipped);
    }

    #[test]
    fn test_display() {
        assert_eq!(StepResult::Failure.to_string(), "failure");
    }
}

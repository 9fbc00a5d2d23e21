//! Build configuration of a queue, fixed when a build is created.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

/// Full platform that keeps its name instead of being reduced to the prefix.
const JSC_ONLY: &str = "jsc-only";

/// Build flavour passed to every build and test script as `--debug` / `--release`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Configuration {
    Debug,
    Release,
}

impl Configuration {
    pub fn as_str(&self) -> &'static str {
        match self {
            Configuration::Debug => "debug",
            Configuration::Release => "release",
        }
    }

    /// Command-line switch understood by the build scripts.
    pub fn flag(&self) -> String {
        format!("--{}", self.as_str())
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Configuration {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Configuration::Debug),
            "release" => Ok(Configuration::Release),
            other => Err(DomainError::UnknownConfiguration(other.to_string())),
        }
    }
}

/// Immutable description of what a queue builds.
///
/// `platform` is derived from `full_platform` (`mac-mojave` builds for `mac`),
/// except for `jsc-only` which is a platform of its own. A full platform of `*`
/// means "any" and is never exposed as a build property.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildConfiguration {
    pub platform: String,
    pub full_platform: String,
    pub configuration: Option<Configuration>,
    pub architectures: Vec<String>,
    pub build_only: bool,
    pub additional_arguments: Vec<String>,
}

impl BuildConfiguration {
    pub fn new(full_platform: impl Into<String>, configuration: Option<Configuration>) -> Self {
        let full_platform = full_platform.into();
        Self {
            platform: platform_of(&full_platform),
            full_platform,
            configuration,
            architectures: Vec::new(),
            build_only: false,
            additional_arguments: Vec::new(),
        }
    }

    pub fn with_architectures(mut self, architectures: Vec<String>) -> Self {
        self.architectures = architectures;
        self
    }

    pub fn with_build_only(mut self, build_only: bool) -> Self {
        self.build_only = build_only;
        self
    }

    pub fn with_additional_arguments(mut self, arguments: Vec<String>) -> Self {
        self.additional_arguments = arguments;
        self
    }

    /// Architectures joined the way the build scripts expect them (`"x86_64 arm64"`).
    pub fn architecture(&self) -> Option<String> {
        if self.architectures.is_empty() {
            None
        } else {
            Some(self.architectures.join(" "))
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.full_platform.trim().is_empty() {
            return Err(DomainError::InvalidConfiguration(
                "platform must not be empty".to_string(),
            ));
        }
        if self.architectures.iter().any(|a| a.trim().is_empty()) {
            return Err(DomainError::InvalidConfiguration(
                "architectures must not contain empty names".to_string(),
            ));
        }
        Ok(())
    }
}

fn platform_of(full_platform: &str) -> String {
    if full_platform == JSC_ONLY {
        return full_platform.to_string();
    }
    full_platform
        .split_once('-')
        .map(|(prefix, _)| prefix)
        .unwrap_or(full_platform)
        .to_string()
}

//! Worker configuration loaded from a TOML file.
//!
//! ```toml
//! workdir = "/var/ews"
//!
//! [[builders]]
//! name = "macOS-Mojave-Release-Build-EWS"
//! factory = "build"
//! platform = "mac-mojave"
//! configuration = "release"
//! architectures = ["x86_64"]
//!
//! [bug_tracker]
//! base_url = "https://bugs.webkit.org/"
//! timeout_secs = 10
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ews_domain::{BuildConfiguration, Configuration};
use ews_steps::{BugTrackerConfig, CheckoutConfig, Factory, FactoryOptions, StorageConfig, TopicTable};
use serde::{Deserialize, Serialize};

/// One queue this worker serves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuilderConfig {
    pub name: String,
    pub factory: Factory,
    /// Full platform, e.g. `mac-mojave`, `ios-simulator-12` or `jsc-only`.
    pub platform: String,
    #[serde(default)]
    pub configuration: Option<Configuration>,
    #[serde(default)]
    pub architectures: Vec<String>,
    #[serde(default)]
    pub build_only: bool,
    #[serde(default)]
    pub additional_arguments: Vec<String>,
}

impl BuilderConfig {
    pub fn build_configuration(&self) -> BuildConfiguration {
        BuildConfiguration::new(self.platform.clone(), self.configuration)
            .with_architectures(self.architectures.clone())
            .with_build_only(self.build_only)
            .with_additional_arguments(self.additional_arguments.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Parent of the per-build working directories.
    pub workdir: PathBuf,
    pub builders: Vec<BuilderConfig>,
    pub bug_tracker: BugTrackerConfig,
    pub checkout: CheckoutConfig,
    pub storage: StorageConfig,
    /// Replaces the built-in relevance topics when present.
    pub topics: Option<TopicTable>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("."),
            builders: Vec::new(),
            bug_tracker: BugTrackerConfig::default(),
            checkout: CheckoutConfig::default(),
            storage: StorageConfig::default(),
            topics: None,
        }
    }
}

impl WorkerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: WorkerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for builder in &self.builders {
            if !seen.insert(builder.name.as_str()) {
                bail!("builder {} is configured twice", builder.name);
            }
            builder
                .build_configuration()
                .validate()
                .with_context(|| format!("builder {}", builder.name))?;
        }
        if self.checkout.max_attempts == 0 {
            bail!("checkout.max_attempts must be at least 1");
        }
        Ok(())
    }

    pub fn builder(&self, name: &str) -> Result<&BuilderConfig> {
        match self.builders.iter().find(|b| b.name == name) {
            Some(builder) => Ok(builder),
            None => bail!("no builder named {name} in config"),
        }
    }

    pub fn factory_options(&self) -> FactoryOptions {
        FactoryOptions {
            topics: self.topics.clone().unwrap_or_default(),
            checkout: self.checkout.clone(),
        }
    }
}

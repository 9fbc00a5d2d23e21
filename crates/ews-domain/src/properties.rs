//! Build-scoped properties shared by all steps of one build.
//!
//! Steps never talk to each other directly. A step that detects a condition
//! raises the matching [`Flag`]; later steps decide whether to run by reading
//! flags. Configuration fields are written once, by the configure step.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{BuildConfiguration, Configuration};
use crate::error::{DomainError, Result};

const ANY_PLATFORM: &str = "*";

/// Conditions detected by one step and consumed by later ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Flag {
    /// The patched tree did not compile.
    #[serde(rename = "patchFailedToBuild")]
    PatchFailedToBuild,
    /// JavaScriptCore tests failed with the patch applied.
    #[serde(rename = "patchFailedJSCTests")]
    PatchFailedJscTests,
    /// API tests failed twice with the patch applied.
    #[serde(rename = "patchFailedAPITests")]
    PatchFailedApiTests,
}

impl Flag {
    pub const ALL: [Flag; 3] = [
        Flag::PatchFailedToBuild,
        Flag::PatchFailedJscTests,
        Flag::PatchFailedApiTests,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Flag::PatchFailedToBuild => "patchFailedToBuild",
            Flag::PatchFailedJscTests => "patchFailedJSCTests",
            Flag::PatchFailedApiTests => "patchFailedAPITests",
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed property bag of one build.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildProperties {
    /// Patch under test; `None` for forced builds of the tree.
    pub patch_id: Option<u64>,
    /// Bug the patch belongs to, when the scheduler already knows it.
    pub bug_id: Option<u64>,
    pub builder_name: String,
    pub build_number: u64,

    configured: bool,
    platform: Option<String>,
    full_platform: Option<String>,
    configuration: Option<Configuration>,
    architecture: Option<String>,
    build_only: bool,
    additional_arguments: Vec<String>,

    flags: BTreeSet<Flag>,
}

impl BuildProperties {
    pub fn new(builder_name: impl Into<String>, build_number: u64) -> Self {
        Self {
            builder_name: builder_name.into(),
            build_number,
            ..Self::default()
        }
    }

    pub fn with_patch(mut self, patch_id: u64) -> Self {
        self.patch_id = Some(patch_id);
        self
    }

    pub fn with_bug(mut self, bug_id: u64) -> Self {
        self.bug_id = Some(bug_id);
        self
    }

    /// Copy the queue configuration into the build. Allowed once per build.
    pub fn apply_configuration(&mut self, config: &BuildConfiguration) -> Result<()> {
        if self.configured {
            return Err(DomainError::AlreadyConfigured);
        }
        config.validate()?;

        if !config.platform.is_empty() && config.platform != ANY_PLATFORM {
            self.platform = Some(config.platform.clone());
        }
        if !config.full_platform.is_empty() && config.full_platform != ANY_PLATFORM {
            self.full_platform = Some(config.full_platform.clone());
        }
        self.configuration = config.configuration;
        self.architecture = config.architecture();
        self.build_only = config.build_only;
        self.additional_arguments = config.additional_arguments.clone();
        self.configured = true;
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    pub fn full_platform(&self) -> Option<&str> {
        self.full_platform.as_deref()
    }

    pub fn configuration(&self) -> Option<Configuration> {
        self.configuration
    }

    pub fn architecture(&self) -> Option<&str> {
        self.architecture.as_deref()
    }

    pub fn build_only(&self) -> bool {
        self.build_only
    }

    pub fn additional_arguments(&self) -> &[String] {
        &self.additional_arguments
    }

    pub fn flag(&self, flag: Flag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn any_flag(&self, flags: &[Flag]) -> bool {
        flags.iter().any(|f| self.flag(*f))
    }

    /// Raise or clear a flag. Clearing is reserved for re-run steps resetting their own flag.
    pub fn set_flag(&mut self, flag: Flag, value: bool) {
        if value {
            self.flags.insert(flag);
        } else {
            self.flags.remove(&flag);
        }
    }

    pub fn flags(&self) -> impl Iterator<Item = Flag> + '_ {
        self.flags.iter().copied()
    }
}

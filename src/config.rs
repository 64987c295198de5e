//! Tool configuration, read from a JSON file. Every field has a default, so
//! an absent file and `{}` mean the same thing.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::constraints::CapacityThreshold;
use crate::error::{PlacementError, Result};
use crate::inspect::Flavor;
use crate::runner::{CommandRunner, ProcessRunner};

/// Which inspection flavor to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlavorSetting {
    /// Probe the backend version at startup
    #[default]
    Auto,
    Classic,
    Attribute,
}

impl FlavorSetting {
    pub fn resolve<R: CommandRunner + ?Sized>(self, runner: &R) -> Flavor {
        match self {
            FlavorSetting::Auto => Flavor::probe(runner),
            FlavorSetting::Classic => Flavor::Classic,
            FlavorSetting::Attribute => Flavor::Attribute,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Path of the volume administration tool
    #[serde(default = "default_vos_path")]
    pub vos_path: PathBuf,

    /// Cell to operate on; the tool's default cell when absent
    #[serde(default)]
    pub cell: Option<String>,

    /// Authenticate with the server's own key
    #[serde(default)]
    pub localauth: bool,

    #[serde(default)]
    pub threshold: CapacityThreshold,

    #[serde(default)]
    pub flavor: FlavorSetting,

    /// Batch runs stop before the next volume once this file exists
    #[serde(default)]
    pub stop_file: Option<PathBuf>,
}

fn default_vos_path() -> PathBuf {
    PathBuf::from("vos")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vos_path: default_vos_path(),
            cell: None,
            localauth: false,
            threshold: CapacityThreshold::default(),
            flavor: FlavorSetting::default(),
            stop_file: None,
        }
    }
}

impl Config {
    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = fs::read_to_string(path)
            .map_err(|e| PlacementError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| PlacementError::Config(format!("invalid config JSON in {}: {}", path.display(), e)))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.vos_path.as_os_str().is_empty() {
            return Err(PlacementError::Config("vos_path must not be empty".into()));
        }
        if matches!(&self.cell, Some(cell) if cell.trim().is_empty()) {
            return Err(PlacementError::Config("cell must not be empty when given".into()));
        }
        Ok(())
    }

    /// Runner for the administration tool with this configuration's
    /// connection arguments.
    pub fn runner(&self) -> ProcessRunner {
        ProcessRunner::new(&self.vos_path)
            .with_cell(self.cell.as_deref())
            .with_localauth(self.localauth)
    }
}

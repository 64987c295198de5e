use serde::{Deserialize, Serialize};

use crate::error::{PlacementError, Result};
use crate::models::{Location, ServerName};
use crate::selector::PartitionSpec;

/// Ratio of a partition's total space beyond which nothing new is placed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct CapacityThreshold(f64);

impl CapacityThreshold {
    pub const DEFAULT: f64 = 0.90;

    pub fn new(ratio: f64) -> Result<Self> {
        if ratio > 0.0 && ratio <= 1.0 {
            Ok(Self(ratio))
        } else {
            Err(PlacementError::Config(format!(
                "capacity threshold must be in (0, 1], got {}",
                ratio
            )))
        }
    }

    pub fn ratio(&self) -> f64 {
        self.0
    }
}

impl Default for CapacityThreshold {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl TryFrom<f64> for CapacityThreshold {
    type Error = PlacementError;

    fn try_from(ratio: f64) -> Result<Self> {
        Self::new(ratio)
    }
}

impl From<CapacityThreshold> for f64 {
    fn from(threshold: CapacityThreshold) -> f64 {
        threshold.0
    }
}

/// Options that control one reconciliation run
#[derive(Debug, Clone, Default)]
pub struct PlacementOptions {
    /// Release even though the primary holds unreleased changes
    pub force: bool,

    /// Capacity safety threshold applied to every destination partition
    pub threshold: CapacityThreshold,

    /// Produce and render the plan without executing anything
    pub dry_run: bool,
}

impl PlacementOptions {
    /// Options for previewing a plan
    pub fn preview() -> Self {
        Self {
            dry_run: true,
            ..Default::default()
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_threshold(mut self, threshold: CapacityThreshold) -> Self {
        self.threshold = threshold;
        self
    }
}

/// One requested location: a server and the partitions acceptable on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredLocation {
    pub server: ServerName,
    pub spec: PartitionSpec,
}

impl DesiredLocation {
    pub fn new(server: impl Into<ServerName>, spec: PartitionSpec) -> Self {
        Self {
            server: server.into(),
            spec,
        }
    }

    pub fn parse(server: &str, spec: &str) -> Result<Self> {
        if server.trim().is_empty() {
            return Err(PlacementError::MalformedLocations("empty server name".into()));
        }
        Ok(Self::new(server.trim(), PartitionSpec::parse(spec)?))
    }

    /// Parse alternating `server spec` tokens.
    pub fn parse_pairs<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<Self>> {
        if tokens.len() % 2 != 0 {
            return Err(PlacementError::MalformedLocations(format!(
                "expected server/partition pairs, got {} tokens",
                tokens.len()
            )));
        }

        tokens
            .chunks(2)
            .map(|pair| Self::parse(pair[0].as_ref(), pair[1].as_ref()))
            .collect()
    }
}

/// What the caller wants the volume to look like
#[derive(Debug, Clone)]
pub enum DesiredPlacement {
    /// Full topology: primary location first, then one location per replica
    Topology(Vec<DesiredLocation>),

    /// Evacuate exactly one site, leaving every other site alone
    SingleSite { from: Location, to: DesiredLocation },
}

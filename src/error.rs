//! Error types for volume placement.
//!
//! Every variant that concerns a particular volume carries its name, so that a
//! message read from an unattended batch log says which volume failed and which
//! rule it broke.

use thiserror::Error;

use crate::models::{Location, ServerName, VolumeName};

pub type Result<T> = std::result::Result<T, PlacementError>;

#[derive(Debug, Error)]
pub enum PlacementError {
    // Input errors
    #[error("{}invalid partition spec `{spec}`: {reason}", volume_prefix(.volume))]
    InvalidPartitionSpec {
        volume: Option<VolumeName>,
        spec: String,
        reason: String,
    },

    #[error("malformed desired locations: {0}")]
    MalformedLocations(String),

    #[error("volume {volume}: server {server} appears more than once in the desired locations")]
    DuplicateServer { volume: String, server: ServerName },

    #[error("{}no partition on server {server} matches `{spec}`", volume_prefix(.volume))]
    NoCandidateFound {
        volume: Option<VolumeName>,
        server: ServerName,
        spec: String,
    },

    // Inspection
    #[error("volume {0} does not exist")]
    VolumeNotFound(String),

    #[error("volume {0} is not a read-write volume")]
    NotPrimary(String),

    #[error("volume {volume} reports {count} read-write sites; refusing to guess which is authoritative")]
    MultiplePrimaries { volume: String, count: usize },

    // Invariant violations
    #[error(
        "volume {volume}: replication count mismatch, {desired} locations given but the volume occupies {current} sites"
    )]
    ReplicationCountMismatch {
        volume: String,
        desired: usize,
        current: usize,
    },

    #[error("volume {volume}: no site at {site}")]
    SiteNotFound { volume: String, site: Location },

    #[error("volume {0}: plan would leave the primary without its companion replica")]
    ReplicationDropped(String),

    #[error("volume {volume}: server {server} already hosts a site")]
    SiteAlreadyExists { volume: String, server: ServerName },

    #[error("volume {volume}: plan would leave two sites on server {server}")]
    ColocatedSites { volume: String, server: ServerName },

    // Safety violations
    #[error("volume {volume}: insufficient space on {site}, need {needed_kb} K, {available_kb} K available under threshold")]
    InsufficientSpace {
        volume: String,
        site: Location,
        needed_kb: u64,
        available_kb: i64,
    },

    #[error("volume {0} has unreleased changes; releasing requires force")]
    UnsafeRelease(String),

    // Adapters
    #[error("unparseable {what}: {detail}")]
    Unparseable { what: &'static str, detail: String },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PlacementError {
    /// True for problems with what the caller asked for, caught before any
    /// external system is touched.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            PlacementError::InvalidPartitionSpec { .. }
                | PlacementError::MalformedLocations(_)
                | PlacementError::DuplicateServer { .. }
                | PlacementError::NoCandidateFound { .. }
        )
    }

    /// Violations that `force` or a higher threshold could override.
    pub fn is_safety_violation(&self) -> bool {
        matches!(
            self,
            PlacementError::UnsafeRelease(_) | PlacementError::InsufficientSpace { .. }
        )
    }

    /// Attach the volume to errors raised before the volume was known.
    pub fn for_volume(self, name: &str) -> Self {
        match self {
            PlacementError::InvalidPartitionSpec { volume: None, spec, reason } => PlacementError::InvalidPartitionSpec {
                volume: Some(name.to_string()),
                spec,
                reason,
            },
            PlacementError::NoCandidateFound { volume: None, server, spec } => PlacementError::NoCandidateFound {
                volume: Some(name.to_string()),
                server,
                spec,
            },
            other => other,
        }
    }

    pub(crate) fn unparseable(what: &'static str, detail: impl Into<String>) -> Self {
        PlacementError::Unparseable {
            what,
            detail: detail.into(),
        }
    }
}

fn volume_prefix(volume: &Option<VolumeName>) -> String {
    volume.as_ref().map(|v| format!("volume {}: ", v)).unwrap_or_default()
}

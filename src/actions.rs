use crate::models::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single placement step for one volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Move the primary from one site to another
    Move {
        volume: VolumeName,
        from: Location,
        to: Location,
        size_kb: u64,
    },

    /// Define a new replica site
    AddSite {
        volume: VolumeName,
        site: Location,
        size_kb: u64,
    },

    /// Remove a replica site
    RemoveSite { volume: VolumeName, site: Location },

    /// Snapshot the primary into its backup clone
    Backup { volume: VolumeName },

    /// Propagate the primary's content to every replica
    Release { volume: VolumeName },
}

impl Operation {
    pub fn volume(&self) -> &str {
        match self {
            Operation::Move { volume, .. }
            | Operation::AddSite { volume, .. }
            | Operation::RemoveSite { volume, .. }
            | Operation::Backup { volume }
            | Operation::Release { volume } => volume,
        }
    }

    /// Kilobytes that land on a new partition when this runs
    pub fn data_transfer_kb(&self) -> u64 {
        match self {
            Operation::Move { size_kb, .. } | Operation::AddSite { size_kb, .. } => *size_kb,
            _ => 0,
        }
    }

    /// Get the servers touched by this operation
    pub fn affected_servers(&self) -> Vec<&ServerName> {
        match self {
            Operation::Move { from, to, .. } => vec![&from.server, &to.server],
            Operation::AddSite { site, .. } | Operation::RemoveSite { site, .. } => {
                vec![&site.server]
            }
            Operation::Backup { .. } | Operation::Release { .. } => Vec::new(),
        }
    }

    /// Get a human-readable description
    pub fn description(&self) -> String {
        match self {
            Operation::Move {
                volume,
                from,
                to,
                size_kb,
            } => format!("Move {} from {} to {} ({} K)", volume, from, to, size_kb),
            Operation::AddSite { volume, site, .. } => {
                format!("Add replica site for {} on {}", volume, site)
            }
            Operation::RemoveSite { volume, site } => {
                format!("Remove replica site for {} on {}", volume, site)
            }
            Operation::Backup { volume } => format!("Back up {}", volume),
            Operation::Release { volume } => format!("Release {}", volume),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// An ordered, fully validated plan for one volume.
///
/// `basis` is the topology the plan was computed against; the operations are
/// only meaningful when applied to it, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub volume: VolumeName,
    pub basis: Topology,
    pub operations: Vec<Operation>,
    pub needs_release: bool,
    pub total_data_transfer_kb: u64,
    pub metadata: PlanMetadata,
}

impl Plan {
    pub fn new(volume: impl Into<VolumeName>, basis: Topology, operations: Vec<Operation>, needs_release: bool) -> Self {
        let total_data_transfer_kb = operations.iter().map(Operation::data_transfer_kb).sum();

        Self {
            volume: volume.into(),
            basis,
            operations,
            needs_release,
            total_data_transfer_kb,
            metadata: PlanMetadata::default(),
        }
    }

    /// Check if this plan is empty
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn contains_release(&self) -> bool {
        self.operations
            .iter()
            .any(|op| matches!(op, Operation::Release { .. }))
    }

    /// Replica sites this plan deletes
    pub fn removals(&self) -> impl Iterator<Item = &Location> {
        self.operations.iter().filter_map(|op| match op {
            Operation::RemoveSite { site, .. } => Some(site),
            _ => None,
        })
    }

    /// Topology the volume ends up in once every operation has succeeded
    pub fn outcome(&self) -> crate::error::Result<Topology> {
        self.basis.simulate_all(&self.volume, &self.operations)
    }

    /// Numbered, one-line-per-operation rendering used for dry runs
    pub fn render(&self) -> String {
        if self.is_empty() {
            return format!("{}: already in place, nothing to do\n", self.volume);
        }

        let mut out = String::new();
        for (i, op) in self.operations.iter().enumerate() {
            out.push_str(&format!("{:>3}. {}\n", i + 1, op));
        }
        out
    }

    /// Get summary statistics
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary {
            volume: self.volume.clone(),
            total_operations: self.operations.len(),
            total_data_transfer_kb: self.total_data_transfer_kb,
            ..Default::default()
        };

        for op in &self.operations {
            match op {
                Operation::Move { .. } => summary.move_count += 1,
                Operation::AddSite { .. } => summary.add_site_count += 1,
                Operation::RemoveSite { .. } => summary.remove_site_count += 1,
                Operation::Backup { .. } => summary.backup_count += 1,
                Operation::Release { .. } => summary.release_count += 1,
            }
        }

        summary
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanMetadata {
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub single_site: bool,
}

impl Default for PlanMetadata {
    fn default() -> Self {
        Self {
            created_at: Some(chrono::Utc::now()),
            single_site: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanSummary {
    pub volume: VolumeName,
    pub total_operations: usize,
    pub move_count: usize,
    pub add_site_count: usize,
    pub remove_site_count: usize,
    pub backup_count: usize,
    pub release_count: usize,
    pub total_data_transfer_kb: u64,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} operations, Moves: {}, Adds: {}, Removes: {}, Releases: {}, Data Transfer: {} K",
            self.volume,
            self.total_operations,
            self.move_count,
            self.add_site_count,
            self.remove_site_count,
            self.release_count,
            self.total_data_transfer_kb
        )
    }
}

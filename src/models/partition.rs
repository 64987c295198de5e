use serde::{Deserialize, Serialize};

use super::{Location, PartitionId, ServerName};
use crate::error::{PlacementError, Result};

const DEVICE_PREFIX: &str = "/vicep";

/// Capacity snapshot of one partition on one server, in kilobytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub server: ServerName,
    pub id: PartitionId,
    pub free_kb: u64,
    pub total_kb: u64,
}

impl Partition {
    pub fn new(server: impl Into<ServerName>, id: impl Into<PartitionId>, free_kb: u64, total_kb: u64) -> Self {
        Self {
            server: server.into(),
            id: id.into(),
            free_kb,
            total_kb,
        }
    }

    pub fn location(&self) -> Location {
        Location::new(self.server.clone(), self.id.clone())
    }

    pub fn used_kb(&self) -> u64 {
        self.total_kb.saturating_sub(self.free_kb)
    }

    /// Fraction of the partition in use (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.total_kb == 0 {
            return 1.0;
        }
        self.used_kb() as f64 / self.total_kb as f64
    }

    /// Space that may still be filled before crossing `threshold` of the
    /// partition's total. Negative once the partition is already past it.
    pub fn available_kb(&self, threshold: f64) -> i64 {
        let reserved = self.total_kb as f64 * (1.0 - threshold);
        (self.free_kb as f64 - reserved).floor() as i64
    }

    /// Check if placing `size_kb` here keeps the partition under `threshold`
    pub fn can_accommodate(&self, size_kb: u64, threshold: f64) -> bool {
        self.available_kb(threshold) >= size_kb as i64
    }
}

/// Accepts `a`, `aa` or the device form `/vicepa` and returns the bare letters.
pub fn normalize_partition(raw: &str) -> Result<PartitionId> {
    let letters = raw.trim().strip_prefix(DEVICE_PREFIX).unwrap_or(raw.trim());
    let valid = !letters.is_empty()
        && letters.len() <= 2
        && letters.chars().all(|c| c.is_ascii_lowercase());
    if !valid {
        return Err(PlacementError::InvalidPartitionSpec {
            volume: None,
            spec: raw.to_string(),
            reason: "partitions are named by one or two lowercase letters".into(),
        });
    }
    Ok(letters.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_space_applies_threshold() {
        let partition = Partition::new("fs1", "a", 400, 1000);
        // 10% of 1000 is held back
        assert_eq!(partition.available_kb(0.9), 300);
        assert!(partition.can_accommodate(300, 0.9));
        assert!(!partition.can_accommodate(301, 0.9));
    }

    #[test]
    fn test_available_space_goes_negative_past_threshold() {
        let partition = Partition::new("fs1", "a", 50, 1000);
        assert_eq!(partition.available_kb(0.9), -50);
        assert!(!partition.can_accommodate(0, 0.9));
    }

    #[test]
    fn test_normalize_partition() {
        assert_eq!(normalize_partition("/vicepb").unwrap(), "b");
        assert_eq!(normalize_partition("ab").unwrap(), "ab");
        assert!(normalize_partition("/vicep").is_err());
        assert!(normalize_partition("B").is_err());
        assert!(normalize_partition("abc").is_err());
    }
}

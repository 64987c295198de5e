use serde::{Deserialize, Serialize};
use std::fmt;

use super::{PartitionId, ServerName};

/// A (server, partition) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub server: ServerName,
    pub partition: PartitionId,
}

impl Location {
    pub fn new(server: impl Into<ServerName>, partition: impl Into<PartitionId>) -> Self {
        Self {
            server: server.into(),
            partition: partition.into(),
        }
    }

    /// Device path of the partition, as the storage tools expect it
    pub fn device(&self) -> String {
        format!("/vicep{}", self.partition)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.server, self.partition)
    }
}

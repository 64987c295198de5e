// Type aliases used across models
pub type ServerName = String;
pub type PartitionId = String; // letter identifier: "a" for /vicepa
pub type VolumeName = String;

// Module declarations
mod partition;
mod site;
mod topology;
mod volume;

// Re-exports
pub use partition::{normalize_partition, Partition};
pub use site::Location;
pub use topology::Topology;
pub use volume::Volume;

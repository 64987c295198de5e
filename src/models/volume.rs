use serde::{Deserialize, Serialize};

use super::VolumeName;

const READONLY_SUFFIX: &str = ".readonly";
const BACKUP_SUFFIX: &str = ".backup";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: VolumeName,
    pub size_kb: u64,
    /// The primary holds changes that no replica has seen yet
    pub unreleased: bool,
}

impl Volume {
    pub fn new(name: impl Into<VolumeName>, size_kb: u64) -> Self {
        Self {
            name: name.into(),
            size_kb,
            unreleased: false,
        }
    }

    pub fn with_unreleased(mut self, unreleased: bool) -> Self {
        self.unreleased = unreleased;
        self
    }

    /// Names ending in `.readonly` or `.backup` refer to clones, never the primary.
    pub fn is_clone_name(name: &str) -> bool {
        name.ends_with(READONLY_SUFFIX) || name.ends_with(BACKUP_SUFFIX)
    }
}

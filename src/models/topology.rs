use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{Location, ServerName};
use crate::actions::Operation;
use crate::error::{PlacementError, Result};

/// Where a volume lives: one primary, then its replicas in listing order.
///
/// A replica on the primary's own server is the primary's companion clone
/// rather than an independent site; see [`Topology::site_count`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub primary: Location,
    pub replicas: Vec<Location>,
}

impl Topology {
    pub fn new(primary: Location) -> Self {
        Self {
            primary,
            replicas: Vec::new(),
        }
    }

    pub fn with_replica(mut self, replica: Location) -> Self {
        self.replicas.push(replica);
        self
    }

    pub fn is_replicated(&self) -> bool {
        !self.replicas.is_empty()
    }

    /// Number of distinct servers the volume occupies.
    pub fn site_count(&self) -> usize {
        std::iter::once(&self.primary.server)
            .chain(self.replicas.iter().map(|r| &r.server))
            .collect::<HashSet<_>>()
            .len()
    }

    /// The replica sharing the primary's server, if any
    pub fn companion(&self) -> Option<&Location> {
        self.replica_on(&self.primary.server)
    }

    pub fn replica_on(&self, server: &str) -> Option<&Location> {
        self.replicas.iter().find(|r| r.server == server)
    }

    /// Whether any site, primary or replica, sits on `server`
    pub fn hosts(&self, server: &str) -> bool {
        self.primary.server == server || self.replica_on(server).is_some()
    }

    /// A server holding two independent sites: two replicas, since a replica
    /// next to the primary is its companion.
    pub fn colocated_server(&self) -> Option<&ServerName> {
        let mut seen = HashSet::new();
        self.replicas
            .iter()
            .map(|r| &r.server)
            .find(|server| !seen.insert(*server))
    }

    /// Simulate one operation
    pub fn simulate(&self, volume: &str, operation: &Operation) -> Result<Topology> {
        let mut next = self.clone();

        match operation {
            Operation::Move { from, to, .. } => {
                if *from != next.primary {
                    return Err(PlacementError::SiteNotFound {
                        volume: volume.to_string(),
                        site: from.clone(),
                    });
                }
                next.primary = to.clone();
            }
            Operation::AddSite { site, .. } => {
                if next.replicas.contains(site) {
                    return Err(PlacementError::SiteAlreadyExists {
                        volume: volume.to_string(),
                        server: site.server.clone(),
                    });
                }
                next.replicas.push(site.clone());
            }
            Operation::RemoveSite { site, .. } => {
                let idx = next.replicas.iter().position(|r| r == site).ok_or_else(|| {
                    PlacementError::SiteNotFound {
                        volume: volume.to_string(),
                        site: site.clone(),
                    }
                })?;
                next.replicas.remove(idx);
            }
            // Neither changes placement
            Operation::Backup { .. } | Operation::Release { .. } => {}
        }

        Ok(next)
    }

    /// Simulate a whole sequence of operations in order
    pub fn simulate_all<'a>(
        &self,
        volume: &str,
        operations: impl IntoIterator<Item = &'a Operation>,
    ) -> Result<Topology> {
        operations
            .into_iter()
            .try_fold(self.clone(), |topology, op| topology.simulate(volume, op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(server: &str, partition: &str) -> Location {
        Location::new(server, partition)
    }

    #[test]
    fn test_site_count_folds_companion() {
        let topology = Topology::new(loc("fs1", "a"))
            .with_replica(loc("fs1", "a"))
            .with_replica(loc("fs2", "b"));
        assert_eq!(topology.site_count(), 2);
        assert_eq!(topology.companion(), Some(&loc("fs1", "a")));
        assert!(topology.colocated_server().is_none());
    }

    #[test]
    fn test_colocated_replicas_detected() {
        let topology = Topology::new(loc("fs1", "a"))
            .with_replica(loc("fs2", "a"))
            .with_replica(loc("fs2", "b"));
        assert_eq!(topology.colocated_server().map(String::as_str), Some("fs2"));
    }

    #[test]
    fn test_simulate_move_and_replace() {
        let topology = Topology::new(loc("fs1", "a")).with_replica(loc("fs2", "b"));
        let ops = vec![
            Operation::Move {
                volume: "v".into(),
                from: loc("fs1", "a"),
                to: loc("fs3", "c"),
                size_kb: 10,
            },
            Operation::AddSite {
                volume: "v".into(),
                site: loc("fs4", "a"),
                size_kb: 10,
            },
            Operation::Release { volume: "v".into() },
            Operation::RemoveSite {
                volume: "v".into(),
                site: loc("fs2", "b"),
            },
        ];

        let end = topology.simulate_all("v", &ops).unwrap();
        assert_eq!(end.primary, loc("fs3", "c"));
        assert_eq!(end.replicas, vec![loc("fs4", "a")]);
    }

    #[test]
    fn test_simulate_rejects_missing_site() {
        let topology = Topology::new(loc("fs1", "a"));
        let op = Operation::RemoveSite {
            volume: "v".into(),
            site: loc("fs2", "b"),
        };
        assert!(matches!(
            topology.simulate("v", &op),
            Err(PlacementError::SiteNotFound { .. })
        ));
    }
}

use crate::actions::{Operation, Plan};
use crate::constraints::{CapacityThreshold, DesiredLocation};
use crate::error::{PlacementError, Result};
use crate::gates::{check_replication_count, SafetyGate};
use crate::models::{Location, Partition, Topology, Volume};
use crate::selector::{CapacitySource, PartitionSelector};
use std::collections::HashSet;

/// Computes the ordered operations that take a volume from its current
/// topology to the desired one.
///
/// Every check runs before a plan is returned, so a plan either comes back
/// whole and authorized or not at all.
pub struct TopologyPlanner {
    gate: SafetyGate,
    threshold: CapacityThreshold,
}

impl TopologyPlanner {
    pub fn new(threshold: CapacityThreshold) -> Self {
        Self {
            gate: SafetyGate::default(),
            threshold,
        }
    }

    /// Plan a full topology: `desired[0]` is the primary's location, the rest
    /// are replica locations.
    pub fn plan<C: CapacitySource + ?Sized>(
        &self,
        capacity: &C,
        volume: &Volume,
        current: &Topology,
        desired: &[DesiredLocation],
        force: bool,
    ) -> Result<Plan> {
        validate_desired(&volume.name, desired)?;
        check_replication_count(&volume.name, current, desired.len())?;

        let mut selector = PartitionSelector::new(capacity).for_volume(&volume.name);
        let mut operations = Vec::new();
        let mut needs_release = false;
        // Current replicas not yet matched to a desired location
        let mut unmatched = current.replicas.clone();

        // Phase A: primary placement
        let target = &desired[0];
        let primary = &current.primary;
        let replicated = current.is_replicated();

        if replicated && target.server == primary.server {
            // Never move a replicated primary within its own server
            selector.select(&target.server, &target.spec)?;
            unmatched.retain(|r| r.server != primary.server);
            tracing::debug!(volume = %volume.name, server = %primary.server, "primary already on requested server");
        } else if target.server == primary.server && target.spec.matches(&primary.partition) {
            tracing::debug!(volume = %volume.name, site = %primary, "primary already in place");
        } else {
            let chosen = selector.select(&target.server, &target.spec)?;
            self.ensure_capacity(volume, &chosen)?;
            let to = chosen.location();

            operations.push(Operation::Move {
                volume: volume.name.clone(),
                from: primary.clone(),
                to: to.clone(),
                size_kb: volume.size_kb,
            });
            operations.push(Operation::Backup {
                volume: volume.name.clone(),
            });

            if replicated {
                needs_release = true;
                match unmatched.iter().position(|r| r.server == to.server) {
                    Some(idx) => {
                        let existing = unmatched.remove(idx);
                        if existing.partition != to.partition {
                            // The replica beside the new primary belongs on its partition
                            operations.push(Operation::RemoveSite {
                                volume: volume.name.clone(),
                                site: existing,
                            });
                            operations.push(Operation::AddSite {
                                volume: volume.name.clone(),
                                site: to,
                                size_kb: volume.size_kb,
                            });
                        }
                    }
                    // The companion follows the primary; the old one is retired in phase C
                    None if current.companion().is_some() => {
                        operations.push(Operation::AddSite {
                            volume: volume.name.clone(),
                            site: to,
                            size_kb: volume.size_kb,
                        });
                    }
                    None => {}
                }
            }
        }

        // Phase B: replica placement
        for target in &desired[1..] {
            if let Some(idx) = unmatched.iter().position(|r| r.server == target.server) {
                let existing = unmatched.remove(idx);
                tracing::debug!(volume = %volume.name, site = %existing, "replica already in place");
                continue;
            }

            let chosen = selector.select(&target.server, &target.spec)?;
            self.ensure_capacity(volume, &chosen)?;
            operations.push(Operation::AddSite {
                volume: volume.name.clone(),
                site: chosen.location(),
                size_kb: volume.size_kb,
            });
            needs_release = true;
        }

        // Phase C: release, then retire whatever was not matched
        if needs_release {
            operations.push(Operation::Release {
                volume: volume.name.clone(),
            });
        }
        operations.extend(unmatched.into_iter().map(|site| Operation::RemoveSite {
            volume: volume.name.clone(),
            site,
        }));

        let plan = Plan::new(volume.name.clone(), current.clone(), operations, needs_release);
        self.gate.authorize(&plan, volume.unreleased, force)?;
        Ok(plan)
    }

    /// Evacuate the one site at `from` to `to`, leaving every other site alone.
    pub fn plan_single<C: CapacitySource + ?Sized>(
        &self,
        capacity: &C,
        volume: &Volume,
        current: &Topology,
        from: &Location,
        to: &DesiredLocation,
        force: bool,
    ) -> Result<Plan> {
        let mut selector = PartitionSelector::new(capacity).for_volume(&volume.name);
        let mut operations = Vec::new();
        let already_exists = || PlacementError::SiteAlreadyExists {
            volume: volume.name.clone(),
            server: to.server.clone(),
        };

        let needs_release = if *from == current.primary {
            let replicated = current.is_replicated();
            let same_server = to.server == current.primary.server;
            if (same_server && (replicated || to.spec.matches(&current.primary.partition)))
                || (!same_server && current.replica_on(&to.server).is_some())
            {
                return Err(already_exists());
            }

            let chosen = selector.select(&to.server, &to.spec)?;
            self.ensure_capacity(volume, &chosen)?;
            operations.push(Operation::Move {
                volume: volume.name.clone(),
                from: from.clone(),
                to: chosen.location(),
                size_kb: volume.size_kb,
            });
            operations.push(Operation::Backup {
                volume: volume.name.clone(),
            });

            match current.companion() {
                Some(companion) => {
                    operations.push(Operation::AddSite {
                        volume: volume.name.clone(),
                        site: chosen.location(),
                        size_kb: volume.size_kb,
                    });
                    operations.push(Operation::Release {
                        volume: volume.name.clone(),
                    });
                    operations.push(Operation::RemoveSite {
                        volume: volume.name.clone(),
                        site: companion.clone(),
                    });
                }
                None if replicated => {
                    // No companion travels with the primary, so none is created
                    tracing::warn!(
                        volume = %volume.name,
                        from = %from,
                        "moving a replicated primary that has no companion replica; no replica is added at the destination"
                    );
                    operations.push(Operation::Release {
                        volume: volume.name.clone(),
                    });
                }
                None => {}
            }
            replicated
        } else if current.replicas.contains(from) {
            if current.hosts(&to.server) {
                return Err(already_exists());
            }

            let chosen = selector.select(&to.server, &to.spec)?;
            self.ensure_capacity(volume, &chosen)?;
            operations.push(Operation::AddSite {
                volume: volume.name.clone(),
                site: chosen.location(),
                size_kb: volume.size_kb,
            });
            operations.push(Operation::Release {
                volume: volume.name.clone(),
            });
            operations.push(Operation::RemoveSite {
                volume: volume.name.clone(),
                site: from.clone(),
            });
            true
        } else {
            return Err(PlacementError::SiteNotFound {
                volume: volume.name.clone(),
                site: from.clone(),
            });
        };

        let mut plan = Plan::new(volume.name.clone(), current.clone(), operations, needs_release);
        plan.metadata.single_site = true;
        self.gate.authorize(&plan, volume.unreleased, force)?;
        Ok(plan)
    }

    fn ensure_capacity(&self, volume: &Volume, partition: &Partition) -> Result<()> {
        let threshold = self.threshold.ratio();
        if partition.can_accommodate(volume.size_kb, threshold) {
            return Ok(());
        }
        Err(PlacementError::InsufficientSpace {
            volume: volume.name.clone(),
            site: partition.location(),
            needed_kb: volume.size_kb,
            available_kb: partition.available_kb(threshold),
        })
    }
}

impl Default for TopologyPlanner {
    fn default() -> Self {
        Self::new(CapacityThreshold::default())
    }
}

/// Reject a desired topology that is malformed on its face: no locations,
/// or one server named twice.
pub(crate) fn validate_desired(volume: &str, desired: &[DesiredLocation]) -> Result<()> {
    if desired.is_empty() {
        return Err(PlacementError::MalformedLocations(format!(
            "no locations given for volume {}",
            volume
        )));
    }

    let mut seen = HashSet::new();
    for location in desired {
        if !seen.insert(location.server.as_str()) {
            return Err(PlacementError::DuplicateServer {
                volume: volume.to_string(),
                server: location.server.clone(),
            });
        }
    }
    Ok(())
}

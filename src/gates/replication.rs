use super::{Gate, GateContext};
use crate::error::{PlacementError, Result};
use crate::models::Topology;

/// Desired location count must match the sites the volume already occupies.
///
/// An unreplicated volume occupies one site and may only be given one
/// location: this path never adds or drops replication degree.
pub fn check_replication_count(volume: &str, current: &Topology, desired: usize) -> Result<()> {
    let current_sites = current.site_count();
    if desired != current_sites {
        return Err(PlacementError::ReplicationCountMismatch {
            volume: volume.to_string(),
            desired,
            current: current_sites,
        });
    }
    Ok(())
}

/// Verifies that executing the plan leaves the replication degree unchanged
/// and that a primary with a companion still has one afterwards.
pub struct ReplicationGate;

impl Gate for ReplicationGate {
    fn name(&self) -> &str {
        "ReplicationGate"
    }

    fn check(&self, ctx: &GateContext<'_>) -> Result<()> {
        let basis = &ctx.plan.basis;
        if basis.site_count() == ctx.outcome.site_count()
            && basis.companion().is_some()
            && ctx.outcome.companion().is_none()
        {
            return Err(PlacementError::ReplicationDropped(ctx.plan.volume.clone()));
        }

        let degree_changed = basis.site_count() != ctx.outcome.site_count()
            || basis.is_replicated() != ctx.outcome.is_replicated();
        if degree_changed {
            return Err(PlacementError::ReplicationCountMismatch {
                volume: ctx.plan.volume.clone(),
                desired: ctx.outcome.site_count(),
                current: basis.site_count(),
            });
        }
        Ok(())
    }
}

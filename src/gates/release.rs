use super::{Gate, GateContext};
use crate::error::{PlacementError, Result};

/// Refuses to release a primary that holds changes no replica has seen,
/// unless the caller forces it.
pub struct ReleaseGate;

impl Gate for ReleaseGate {
    fn name(&self) -> &str {
        "ReleaseGate"
    }

    fn check(&self, ctx: &GateContext<'_>) -> Result<()> {
        let releases = ctx.plan.needs_release || ctx.plan.contains_release();
        if releases && ctx.unreleased && !ctx.force {
            return Err(PlacementError::UnsafeRelease(ctx.plan.volume.clone()));
        }
        Ok(())
    }
}

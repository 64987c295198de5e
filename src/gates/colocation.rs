use super::{Gate, GateContext};
use crate::error::{PlacementError, Result};

/// No server may end up with two independent sites of one volume
pub struct ColocationGate;

impl Gate for ColocationGate {
    fn name(&self) -> &str {
        "ColocationGate"
    }

    fn check(&self, ctx: &GateContext<'_>) -> Result<()> {
        match ctx.outcome.colocated_server() {
            Some(server) => Err(PlacementError::ColocatedSites {
                volume: ctx.plan.volume.clone(),
                server: server.clone(),
            }),
            None => Ok(()),
        }
    }
}

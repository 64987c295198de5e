use crate::actions::Plan;
use crate::error::Result;
use crate::models::Topology;

/// Everything a gate may look at when judging a plan
#[derive(Debug)]
pub struct GateContext<'a> {
    pub plan: &'a Plan,
    /// Topology after every operation of the plan has run
    pub outcome: &'a Topology,
    pub unreleased: bool,
    pub force: bool,
}

/// A rule every plan must satisfy before anything executes
pub trait Gate: Send + Sync {
    /// Name of this gate
    fn name(&self) -> &str;

    /// Reject the plan with the error naming the broken rule
    fn check(&self, ctx: &GateContext<'_>) -> Result<()>;
}

// Module declarations
mod colocation;
mod release;
mod replication;

// Re-exports
pub use colocation::ColocationGate;
pub use release::ReleaseGate;
pub use replication::{check_replication_count, ReplicationGate};

/// Stateless set of gates applied to a plan before execution
pub struct SafetyGate {
    gates: Vec<Box<dyn Gate>>,
}

impl SafetyGate {
    pub fn new(gates: Vec<Box<dyn Gate>>) -> Self {
        Self { gates }
    }

    /// Refuse to hand over a plan that breaks any gate.
    pub fn authorize(&self, plan: &Plan, unreleased: bool, force: bool) -> Result<()> {
        let outcome = plan.outcome()?;
        let ctx = GateContext {
            plan,
            outcome: &outcome,
            unreleased,
            force,
        };

        for gate in &self.gates {
            if let Err(err) = gate.check(&ctx) {
                tracing::debug!(gate = gate.name(), volume = %plan.volume, "plan rejected");
                return Err(err);
            }
        }
        Ok(())
    }
}

impl Default for SafetyGate {
    fn default() -> Self {
        Self::new(vec![
            Box::new(ReleaseGate),
            Box::new(ReplicationGate),
            Box::new(ColocationGate),
        ])
    }
}

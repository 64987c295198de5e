// Volume Topology Reconciler Library
// Converges a replicated volume onto a requested set of server/partition locations

pub mod actions;
pub mod batch;
pub mod config;
pub mod constraints;
pub mod error;
pub mod executor;
pub mod gates;
pub mod inspect;
pub mod models;
pub mod planner;
pub mod runner;
pub mod selector;

pub use actions::{Operation, Plan, PlanSummary};
pub use batch::{BatchEntry, BatchRunner, BatchSummary};
pub use config::Config;
pub use constraints::{CapacityThreshold, DesiredLocation, DesiredPlacement, PlacementOptions};
pub use error::{PlacementError, Result};
pub use executor::{CommandExecutor, ExecutionReport, PlanExecutor};
pub use inspect::{Inspection, Inspector, VolumeInspector};
pub use models::{Location, Partition, Topology, Volume};
pub use planner::TopologyPlanner;
pub use selector::{PartitionSelector, PartitionSpec};

/// Main entry point: inspect, plan, gate and (unless previewing) execute
pub struct Reconciler<'a> {
    inspector: &'a dyn Inspector,
    executor: &'a dyn CommandExecutor,
}

/// Result of reconciling one volume
#[derive(Debug, Clone)]
pub struct Outcome {
    pub plan: Plan,
    /// `None` for a dry run
    pub report: Option<ExecutionReport>,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        self.report.as_ref().map_or(true, ExecutionReport::is_success)
    }
}

impl<'a> Reconciler<'a> {
    pub fn new(inspector: &'a dyn Inspector, executor: &'a dyn CommandExecutor) -> Self {
        Self { inspector, executor }
    }

    /// Inspect the volume and compute its plan without executing anything
    pub fn plan(&self, volume: &str, desired: &DesiredPlacement, options: &PlacementOptions) -> Result<Plan> {
        // Malformed input fails before the backend is queried
        if let DesiredPlacement::Topology(locations) = desired {
            planner::validate_desired(volume, locations)?;
        }

        let inspection = VolumeInspector::new(self.inspector).inspect(volume)?;
        let planner = TopologyPlanner::new(options.threshold);

        let plan = match desired {
            DesiredPlacement::Topology(locations) => planner.plan(
                self.inspector,
                &inspection.volume,
                &inspection.topology,
                locations,
                options.force,
            )?,
            DesiredPlacement::SingleSite { from, to } => planner.plan_single(
                self.inspector,
                &inspection.volume,
                &inspection.topology,
                from,
                to,
                options.force,
            )?,
        };

        for site in plan.removals() {
            match inspection.access_count(site) {
                Some(accesses) if accesses > 0 => {
                    tracing::warn!(volume = %volume, site = %site, accesses, "removing a replica that is still being read");
                }
                _ => {}
            }
        }

        Ok(plan)
    }

    /// Converge `volume` onto `desired`. Planning failures come back as
    /// errors; an execution failure comes back inside the outcome's report.
    pub fn reconcile(&self, volume: &str, desired: &DesiredPlacement, options: &PlacementOptions) -> Result<Outcome> {
        let plan = self.plan(volume, desired, options)?;
        tracing::info!(summary = %plan.summary(), dry_run = options.dry_run, "planned");

        if options.dry_run || plan.is_empty() {
            return Ok(Outcome { plan, report: None });
        }

        let report = PlanExecutor::new(self.executor).execute(&plan);
        Ok(Outcome {
            plan,
            report: Some(report),
        })
    }
}

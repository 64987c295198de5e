//! Plan execution.
//!
//! Operations run strictly in order, one blocking call each. The first
//! failure halts the plan; nothing is retried or rolled back, the report
//! says exactly how far the plan got.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::actions::{Operation, Plan};
use crate::args;
use crate::error::Result;
use crate::runner::CommandRunner;

/// Carries out a single operation against the storage backend.
pub trait CommandExecutor {
    fn execute(&self, operation: &Operation) -> Result<()>;
}

/// What happened when a plan was executed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub volume: String,
    pub completed: Vec<Operation>,
    /// The operation that failed and the executor's detail
    pub failed: Option<(Operation, String)>,
    pub not_attempted: Vec<Operation>,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_none()
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failed {
            None => write!(f, "{}: {} operation(s) completed", self.volume, self.completed.len()),
            Some((operation, detail)) => {
                writeln!(
                    f,
                    "{}: failed after {} operation(s): {}: {}",
                    self.volume,
                    self.completed.len(),
                    operation,
                    detail
                )?;
                for op in &self.not_attempted {
                    writeln!(f, "  not attempted: {}", op)?;
                }
                Ok(())
            }
        }
    }
}

pub struct PlanExecutor<'a, E: CommandExecutor + ?Sized> {
    executor: &'a E,
}

impl<'a, E: CommandExecutor + ?Sized> PlanExecutor<'a, E> {
    pub fn new(executor: &'a E) -> Self {
        Self { executor }
    }

    pub fn execute(&self, plan: &Plan) -> ExecutionReport {
        let mut report = ExecutionReport {
            volume: plan.volume.clone(),
            completed: Vec::with_capacity(plan.operations.len()),
            failed: None,
            not_attempted: Vec::new(),
        };

        let mut operations = plan.operations.iter();
        for op in operations.by_ref() {
            tracing::info!(volume = %plan.volume, operation = %op, servers = ?op.affected_servers(), "executing");
            match self.executor.execute(op) {
                Ok(()) => report.completed.push(op.clone()),
                Err(err) => {
                    tracing::error!(volume = %plan.volume, operation = %op, error = %err, "operation failed, halting plan");
                    report.failed = Some((op.clone(), err.to_string()));
                    break;
                }
            }
        }
        report.not_attempted = operations.cloned().collect();

        report
    }
}

/// Executes operations with the `vos` administration tool
pub struct VosExecutor<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> VosExecutor<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn arguments(operation: &Operation) -> Vec<String> {
        match operation {
            Operation::Move { volume, from, to, .. } => args![
                "move",
                "-id",
                volume,
                "-fromserver",
                from.server,
                "-frompartition",
                from.device(),
                "-toserver",
                to.server,
                "-topartition",
                to.device()
            ],
            Operation::AddSite { volume, site, .. } => {
                args!["addsite", "-server", site.server, "-partition", site.device(), "-id", volume]
            }
            Operation::RemoveSite { volume, site } => args![
                "remove",
                "-server",
                site.server,
                "-partition",
                site.device(),
                "-id",
                format!("{}.readonly", volume)
            ],
            Operation::Backup { volume } => args!["backup", "-id", volume],
            Operation::Release { volume } => args!["release", "-id", volume],
        }
    }
}

impl<R: CommandRunner> CommandExecutor for VosExecutor<R> {
    fn execute(&self, operation: &Operation) -> Result<()> {
        let output = self.runner.run(&Self::arguments(operation))?;
        if !output.trim().is_empty() {
            tracing::debug!(volume = %operation.volume(), output = %output.trim(), "tool output");
        }
        Ok(())
    }
}

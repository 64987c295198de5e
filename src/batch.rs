//! Batch reconciliation of many volumes.
//!
//! A batch file holds one volume per line, optionally followed by its own
//! `server spec` pairs. Lines without pairs use the shared locations given
//! alongside the file. `#` starts a comment.

use std::fmt;
use std::path::PathBuf;

use crate::constraints::{DesiredLocation, DesiredPlacement, PlacementOptions};
use crate::error::{PlacementError, Result};
use crate::{Outcome, Reconciler};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    /// 1-based line in the batch file
    pub line: usize,
    pub volume: String,
    pub desired: Vec<DesiredLocation>,
}

impl BatchEntry {
    /// Parse a whole batch file. Any malformed line rejects the batch before
    /// a single volume is touched.
    pub fn parse_all(text: &str, shared: Option<&[DesiredLocation]>) -> Result<Vec<Self>> {
        let mut entries = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let content = raw.split('#').next().unwrap_or_default();
            let tokens: Vec<&str> = content.split_whitespace().collect();
            let Some((volume, pairs)) = tokens.split_first() else {
                continue;
            };

            let desired = if pairs.is_empty() {
                match shared {
                    Some(shared) if !shared.is_empty() => shared.to_vec(),
                    _ => {
                        return Err(PlacementError::MalformedLocations(format!(
                            "line {}: no locations for {} and no shared locations given",
                            line, volume
                        )))
                    }
                }
            } else {
                DesiredLocation::parse_pairs(pairs).map_err(|err| match err {
                    PlacementError::MalformedLocations(detail) => {
                        PlacementError::MalformedLocations(format!("line {}: {}", line, detail))
                    }
                    other => other.for_volume(volume),
                })?
            };

            entries.push(BatchEntry {
                line,
                volume: volume.to_string(),
                desired,
            });
        }

        Ok(entries)
    }
}

/// Final tally of a batch run
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub succeeded: Vec<Outcome>,
    /// Volume and the reason it failed
    pub failed: Vec<(String, String)>,
    /// Volumes never looked at because the stop file appeared
    pub skipped: Vec<String>,
}

impl BatchSummary {
    pub fn stopped(&self) -> bool {
        !self.skipped.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} succeeded, {} failed", self.succeeded.len(), self.failed.len())?;
        if self.stopped() {
            write!(f, ", {} skipped after stop request", self.skipped.len())?;
        }
        Ok(())
    }
}

/// Runs entries one after another; a failing volume never stops the batch.
pub struct BatchRunner<'a> {
    reconciler: &'a Reconciler<'a>,
    options: PlacementOptions,
    stop_file: Option<PathBuf>,
}

impl<'a> BatchRunner<'a> {
    pub fn new(reconciler: &'a Reconciler<'a>, options: PlacementOptions) -> Self {
        Self {
            reconciler,
            options,
            stop_file: None,
        }
    }

    pub fn with_stop_file(mut self, stop_file: Option<PathBuf>) -> Self {
        self.stop_file = stop_file;
        self
    }

    fn stop_requested(&self) -> bool {
        self.stop_file.as_ref().is_some_and(|path| path.exists())
    }

    pub fn run(&self, entries: &[BatchEntry]) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for (index, entry) in entries.iter().enumerate() {
            if self.stop_requested() {
                tracing::warn!(remaining = entries.len() - index, "stop file present, ending batch");
                summary.skipped = entries[index..].iter().map(|e| e.volume.clone()).collect();
                break;
            }

            let desired = DesiredPlacement::Topology(entry.desired.clone());
            match self.reconciler.reconcile(&entry.volume, &desired, &self.options) {
                Ok(outcome) if outcome.is_success() => summary.succeeded.push(outcome),
                Ok(outcome) => {
                    let reason = outcome
                        .report
                        .as_ref()
                        .map(|r| r.to_string())
                        .unwrap_or_default();
                    tracing::error!(volume = %entry.volume, line = entry.line, "execution halted");
                    summary.failed.push((entry.volume.clone(), reason.trim_end().to_string()));
                }
                Err(err) => {
                    tracing::error!(volume = %entry.volume, line = entry.line, error = %err, "volume failed");
                    summary.failed.push((entry.volume.clone(), err.to_string()));
                }
            }
        }

        tracing::info!(
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            skipped = summary.skipped.len(),
            "batch finished"
        );
        summary
    }
}

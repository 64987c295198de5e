//! In-memory cluster shared by the integration tests.
//!
//! Answers inspection and capacity queries from its state and applies every
//! executed operation to that state, so a second reconcile sees the result
//! of the first.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use volume_reconciler::executor::CommandExecutor;
use volume_reconciler::inspect::{InstanceRole, Inspector, SiteStatus, VolumeStatus};
use volume_reconciler::selector::CapacitySource;
use volume_reconciler::{Location, Operation, Partition, PlacementError, Result};

pub fn loc(server: &str, partition: &str) -> Location {
    Location::new(server, partition)
}

#[derive(Debug, Clone)]
pub struct FakeVolume {
    pub size_kb: u64,
    pub primary: Location,
    pub replicas: Vec<Location>,
    pub unreleased: bool,
    pub replica_accesses: u64,
}

impl FakeVolume {
    pub fn new(size_kb: u64, primary: Location) -> Self {
        Self {
            size_kb,
            primary,
            replicas: Vec::new(),
            unreleased: false,
            replica_accesses: 0,
        }
    }

    pub fn replica(mut self, site: Location) -> Self {
        self.replicas.push(site);
        self
    }

    pub fn unreleased(mut self) -> Self {
        self.unreleased = true;
        self
    }
}

#[derive(Default)]
struct State {
    partitions: Vec<Partition>,
    volumes: HashMap<String, FakeVolume>,
    executed: Vec<Operation>,
}

#[derive(Default)]
pub struct FakeCluster {
    state: RefCell<State>,
    /// Zero-based index of the executed operation that fails
    fail_at: Option<usize>,
    /// File created the first time anything executes
    touch_on_execute: Option<PathBuf>,
    inspections: Cell<usize>,
}

fn released_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap()
}

fn updated_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap()
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition(self, server: &str, id: &str, free_kb: u64, total_kb: u64) -> Self {
        self.state
            .borrow_mut()
            .partitions
            .push(Partition::new(server, id, free_kb, total_kb));
        self
    }

    pub fn volume(self, name: &str, volume: FakeVolume) -> Self {
        self.state.borrow_mut().volumes.insert(name.to_string(), volume);
        self
    }

    pub fn fail_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn touch_on_execute(mut self, path: PathBuf) -> Self {
        self.touch_on_execute = Some(path);
        self
    }

    pub fn executed(&self) -> Vec<Operation> {
        self.state.borrow().executed.clone()
    }

    /// How many times a volume was inspected
    pub fn inspections(&self) -> usize {
        self.inspections.get()
    }

    pub fn current(&self, name: &str) -> FakeVolume {
        self.state.borrow().volumes[name].clone()
    }

    pub fn free_kb(&self, site: &Location) -> u64 {
        self.state
            .borrow()
            .partitions
            .iter()
            .find(|p| p.location() == *site)
            .map(|p| p.free_kb)
            .unwrap_or_default()
    }
}

impl State {
    fn adjust(&mut self, site: &Location, delta: i64) {
        if let Some(p) = self.partitions.iter_mut().find(|p| p.location() == *site) {
            p.free_kb = (p.free_kb as i64 + delta).max(0) as u64;
        }
    }

    fn apply(&mut self, operation: &Operation) {
        let volume = operation.volume().to_string();
        let Some(size) = self.volumes.get(&volume).map(|v| v.size_kb as i64) else {
            return;
        };

        match operation {
            Operation::Move { from, to, .. } => {
                self.adjust(from, size);
                self.adjust(to, -size);
                if let Some(v) = self.volumes.get_mut(&volume) {
                    v.primary = to.clone();
                }
            }
            Operation::AddSite { site, .. } => {
                self.adjust(site, -size);
                if let Some(v) = self.volumes.get_mut(&volume) {
                    v.replicas.push(site.clone());
                }
            }
            Operation::RemoveSite { site, .. } => {
                self.adjust(site, size);
                if let Some(v) = self.volumes.get_mut(&volume) {
                    v.replicas.retain(|r| r != site);
                }
            }
            Operation::Release { .. } => {
                if let Some(v) = self.volumes.get_mut(&volume) {
                    v.unreleased = false;
                }
            }
            Operation::Backup { .. } => {}
        }
    }
}

impl CapacitySource for FakeCluster {
    fn partitions(&self, server: &str) -> Result<Vec<Partition>> {
        Ok(self
            .state
            .borrow()
            .partitions
            .iter()
            .filter(|p| p.server == server)
            .cloned()
            .collect())
    }
}

impl Inspector for FakeCluster {
    fn volume(&self, name: &str) -> Result<VolumeStatus> {
        self.inspections.set(self.inspections.get() + 1);
        let state = self.state.borrow();
        let volume = state
            .volumes
            .get(name)
            .ok_or_else(|| PlacementError::VolumeNotFound(name.to_string()))?;

        let primary_update = if volume.unreleased { updated_at() } else { released_at() };
        let mut sites = vec![SiteStatus {
            location: volume.primary.clone(),
            role: InstanceRole::ReadWrite,
            last_update: Some(primary_update),
            accesses: 100,
        }];
        sites.extend(volume.replicas.iter().map(|r| SiteStatus {
            location: r.clone(),
            role: InstanceRole::ReadOnly,
            last_update: Some(released_at()),
            accesses: volume.replica_accesses,
        }));

        Ok(VolumeStatus {
            name: name.to_string(),
            role: InstanceRole::ReadWrite,
            size_kb: volume.size_kb,
            sites,
        })
    }
}

impl CommandExecutor for FakeCluster {
    fn execute(&self, operation: &Operation) -> Result<()> {
        if let Some(path) = &self.touch_on_execute {
            std::fs::write(path, b"stop")?;
        }

        let mut state = self.state.borrow_mut();
        if self.fail_at == Some(state.executed.len()) {
            return Err(PlacementError::CommandFailed {
                command: operation.to_string(),
                status: "status 1".into(),
                stderr: "Volume server busy".into(),
            });
        }
        state.executed.push(operation.clone());
        state.apply(operation);
        Ok(())
    }
}

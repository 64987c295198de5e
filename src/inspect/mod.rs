//! Discovery of a volume's current placement.
//!
//! Backends report volumes in one of two text flavors. Each flavor has an
//! adapter implementing [`Inspector`], which turns raw tool output into a
//! [`VolumeStatus`]. [`VolumeInspector`] then applies the checks every caller
//! relies on (exactly one primary, the name really is a primary) and produces
//! the [`Inspection`] the planner consumes.

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::{PlacementError, Result};
use crate::models::{normalize_partition, Location, Partition, Topology, Volume};
use crate::runner::CommandRunner;
use crate::selector::CapacitySource;

mod attribute;
mod classic;

pub use attribute::AttributeInspector;
pub use classic::ClassicInspector;

/// Role of one instance of a volume as the backend reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceRole {
    ReadWrite,
    ReadOnly,
    Backup,
}

impl InstanceRole {
    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "RW" => Ok(InstanceRole::ReadWrite),
            "RO" => Ok(InstanceRole::ReadOnly),
            "BK" => Ok(InstanceRole::Backup),
            other => Err(PlacementError::unparseable("volume type", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteStatus {
    pub location: Location,
    pub role: InstanceRole,
    pub last_update: Option<DateTime<Utc>>,
    pub accesses: u64,
}

/// A volume as one backend describes it, before any invariant is checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeStatus {
    pub name: String,
    /// Role of the instance that was examined
    pub role: InstanceRole,
    pub size_kb: u64,
    pub sites: Vec<SiteStatus>,
}

/// Inspection and capacity interface of one backend
pub trait Inspector: CapacitySource {
    fn volume(&self, name: &str) -> Result<VolumeStatus>;
}

/// Output flavor of the backend tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    Classic,
    Attribute,
}

impl Flavor {
    /// Backends from 1.6 on speak the attribute-value flavor.
    pub fn from_version(version: &str) -> Option<Self> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| Regex::new(r"(\d+)\.(\d+)").expect("static pattern"));

        let caps = pattern.captures(version)?;
        let major: u32 = caps[1].parse().ok()?;
        let minor: u32 = caps[2].parse().ok()?;
        if (major, minor) >= (1, 6) {
            Some(Flavor::Attribute)
        } else {
            Some(Flavor::Classic)
        }
    }

    /// Ask the backend for its version; anything unrecognisable is classic.
    pub fn probe<R: CommandRunner + ?Sized>(runner: &R) -> Self {
        match runner.run(&crate::args!["-version"]) {
            Ok(output) => Flavor::from_version(&output).unwrap_or_else(|| {
                tracing::warn!(output = %output.trim(), "unrecognised backend version, assuming classic output");
                Flavor::Classic
            }),
            Err(err) => {
                tracing::warn!(error = %err, "version probe failed, assuming classic output");
                Flavor::Classic
            }
        }
    }

    pub fn inspector<R: CommandRunner + 'static>(self, runner: R) -> Box<dyn Inspector> {
        match self {
            Flavor::Classic => Box::new(ClassicInspector::new(runner)),
            Flavor::Attribute => Box::new(AttributeInspector::new(runner)),
        }
    }
}

/// Normalized view of a primary volume
#[derive(Debug, Clone)]
pub struct Inspection {
    pub volume: Volume,
    pub topology: Topology,
    /// Recent access counters per replica, in topology order
    pub access_counts: Vec<(Location, u64)>,
}

impl Inspection {
    pub fn access_count(&self, replica: &Location) -> Option<u64> {
        self.access_counts
            .iter()
            .find(|(location, _)| location == replica)
            .map(|(_, count)| *count)
    }
}

/// Turns backend reports into the planner's data model
pub struct VolumeInspector<'a, I: Inspector + ?Sized> {
    inspector: &'a I,
}

impl<'a, I: Inspector + ?Sized> VolumeInspector<'a, I> {
    pub fn new(inspector: &'a I) -> Self {
        Self { inspector }
    }

    pub fn inspect(&self, name: &str) -> Result<Inspection> {
        if Volume::is_clone_name(name) {
            return Err(PlacementError::NotPrimary(name.to_string()));
        }

        let status = self.inspector.volume(name)?;
        if status.role != InstanceRole::ReadWrite {
            return Err(PlacementError::NotPrimary(name.to_string()));
        }

        let primaries: Vec<&SiteStatus> = status
            .sites
            .iter()
            .filter(|s| s.role == InstanceRole::ReadWrite)
            .collect();
        let primary = match primaries.as_slice() {
            [only] => *only,
            [] => return Err(PlacementError::NotPrimary(name.to_string())),
            many => {
                return Err(PlacementError::MultiplePrimaries {
                    volume: name.to_string(),
                    count: many.len(),
                })
            }
        };

        let replicas: Vec<&SiteStatus> = status
            .sites
            .iter()
            .filter(|s| s.role == InstanceRole::ReadOnly)
            .collect();

        // A replica that never received a release counts as older than any update
        let unreleased = match primary.last_update {
            Some(updated) => replicas
                .iter()
                .any(|r| r.last_update.map_or(true, |seen| updated > seen)),
            None => false,
        };

        let topology = replicas
            .iter()
            .fold(Topology::new(primary.location.clone()), |topology, r| {
                topology.with_replica(r.location.clone())
            });
        let access_counts = replicas
            .iter()
            .map(|r| (r.location.clone(), r.accesses))
            .collect();

        tracing::debug!(
            volume = %name,
            primary = %primary.location,
            replicas = replicas.len(),
            size_kb = status.size_kb,
            unreleased,
            "inspected volume"
        );

        Ok(Inspection {
            volume: Volume::new(name, status.size_kb).with_unreleased(unreleased),
            topology,
            access_counts,
        })
    }
}

/// One volume instance as printed by either flavor's examine/listvol output
#[derive(Debug, Clone, Default)]
pub(crate) struct InstanceBlock {
    pub(crate) name: String,
    pub(crate) role: Option<InstanceRole>,
    pub(crate) size_kb: u64,
    pub(crate) location: Option<Location>,
    pub(crate) last_update: Option<DateTime<Utc>>,
    pub(crate) accesses: u64,
}

/// Combine the examined instance, its site list and per-replica details into
/// a [`VolumeStatus`]. `replica` looks up the `.readonly` instance at a site.
pub(crate) fn assemble_status(
    examined: InstanceBlock,
    site_list: Vec<(Location, InstanceRole)>,
    mut replica: impl FnMut(&Location) -> Result<Option<InstanceBlock>>,
) -> Result<VolumeStatus> {
    let role = examined
        .role
        .ok_or_else(|| PlacementError::unparseable("volume header", examined.name.clone()))?;

    let mut sites = Vec::with_capacity(site_list.len());
    for (location, site_role) in site_list {
        match site_role {
            InstanceRole::ReadWrite => sites.push(SiteStatus {
                location,
                role: site_role,
                last_update: examined.last_update,
                accesses: examined.accesses,
            }),
            InstanceRole::ReadOnly => {
                let instance = replica(&location)?;
                if instance.is_none() {
                    tracing::warn!(volume = %examined.name, site = %location, "replica listed but not found on its partition");
                }
                sites.push(SiteStatus {
                    location,
                    role: site_role,
                    last_update: instance.as_ref().and_then(|i| i.last_update),
                    accesses: instance.map_or(0, |i| i.accesses),
                });
            }
            InstanceRole::Backup => {}
        }
    }

    Ok(VolumeStatus {
        name: examined.name,
        role,
        size_kb: examined.size_kb,
        sites,
    })
}

/// An unreachable server offers no candidate partitions.
pub(crate) fn partitions_or_unreachable(server: &str, listing: Result<String>) -> Result<Vec<Partition>> {
    match listing {
        Ok(text) => parse_partinfo(server, &text),
        Err(err @ PlacementError::CommandFailed { .. }) => {
            tracing::warn!(server, error = %err, "partition listing failed");
            Ok(Vec::new())
        }
        Err(err) => Err(err),
    }
}

fn site_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*server\s+(\S+)\s+partition\s+(\S+)\s+(RW|RO|BK)\s+Site").expect("static pattern")
    })
}

/// The `server ... partition ... RW Site` lines both flavors print
pub(crate) fn parse_site_list(text: &str) -> Result<Vec<(Location, InstanceRole)>> {
    let sites = text
        .lines()
        .filter_map(|line| site_line_pattern().captures(line))
        .map(|caps| {
            let partition = normalize_partition(&caps[2])?;
            let role = InstanceRole::parse(&caps[3])?;
            Ok((Location::new(&caps[1], partition), role))
        })
        .collect::<Result<Vec<_>>>()?;

    if sites.is_empty() {
        return Err(PlacementError::unparseable("site list", "no `server ... Site` lines"));
    }
    Ok(sites)
}

/// `Free space on partition /vicepa: 12345 K blocks out of total 99999`
pub(crate) fn parse_partinfo(server: &str, text: &str) -> Result<Vec<Partition>> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"Free space on partition (\S+): (\d+) K blocks out of total (\d+)").expect("static pattern")
    });

    let mut partitions = Vec::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let caps = pattern
            .captures(line)
            .ok_or_else(|| PlacementError::unparseable("partition info", line.trim()))?;
        let id = normalize_partition(&caps[1])?;
        let free_kb = parse_number("free space", &caps[2])?;
        let total_kb = parse_number("total space", &caps[3])?;
        partitions.push(Partition::new(server, id, free_kb, total_kb));
    }
    Ok(partitions)
}

pub(crate) fn parse_number(what: &'static str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|_| PlacementError::unparseable(what, raw.trim()))
}

/// `Tue Jan  2 10:00:00 2024`, or `Never`
pub(crate) fn parse_date(raw: &str) -> Result<Option<DateTime<Utc>>> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() || collapsed == "Never" {
        return Ok(None);
    }
    NaiveDateTime::parse_from_str(&collapsed, "%a %b %d %H:%M:%S %Y")
        .map(|naive| Some(naive.and_utc()))
        .map_err(|_| PlacementError::unparseable("date", collapsed))
}

/// Backends report unknown volumes as a failed command; turn that into a
/// proper not-found error.
pub(crate) fn missing_volume(name: &str, err: PlacementError) -> PlacementError {
    match &err {
        PlacementError::CommandFailed { stderr, .. }
            if stderr.contains("no such entry") || stderr.contains("does not exist") =>
        {
            PlacementError::VolumeNotFound(name.to_string())
        }
        _ => err,
    }
}

//! Attribute-value (`-format`) examine/listvol output.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

use super::{
    assemble_status, missing_volume, parse_number, parse_site_list, partitions_or_unreachable, InstanceBlock,
    InstanceRole, Inspector, VolumeStatus,
};
use crate::args;
use crate::error::{PlacementError, Result};
use crate::models::{normalize_partition, Location, Partition};
use crate::runner::CommandRunner;
use crate::selector::CapacitySource;

fn attribute_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([A-Za-z]+)\s+(\S.*?)\s*$").expect("static pattern"))
}

/// `1704189600 Tue Jan  2 10:00:00 2024`: the leading epoch is authoritative,
/// zero meaning never.
fn parse_epoch(raw: &str) -> Result<Option<DateTime<Utc>>> {
    let seconds = raw.split_whitespace().next().unwrap_or_default();
    let seconds: i64 = seconds
        .parse()
        .map_err(|_| PlacementError::unparseable("update date", raw))?;
    if seconds == 0 {
        return Ok(None);
    }
    DateTime::from_timestamp(seconds, 0)
        .map(Some)
        .ok_or_else(|| PlacementError::unparseable("update date", raw))
}

/// One record per `name` attribute; the server and partition arrive as
/// separate attributes and are joined once both are known.
fn parse_records(text: &str) -> Result<Vec<InstanceBlock>> {
    let mut records: Vec<InstanceBlock> = Vec::new();
    let mut server: Option<String> = None;

    for line in text.lines() {
        let Some(caps) = attribute_pattern().captures(line) else {
            continue;
        };
        let (key, value) = (&caps[1], &caps[2]);

        if key == "name" {
            records.push(InstanceBlock {
                name: value.to_string(),
                ..Default::default()
            });
            server = None;
            continue;
        }
        let Some(record) = records.last_mut() else {
            continue;
        };

        match key {
            "type" => record.role = Some(InstanceRole::parse(value)?),
            // address first, then hostname when it resolves
            "serv" => server = value.split_whitespace().last().map(str::to_string),
            "part" => {
                let server = server
                    .clone()
                    .ok_or_else(|| PlacementError::unparseable("volume record", format!("{}: part before serv", record.name)))?;
                record.location = Some(Location::new(server, normalize_partition(value)?));
            }
            "diskused" => record.size_kb = parse_number("disk used", value)?,
            "updateDate" => record.last_update = parse_epoch(value)?,
            "dayUse" => record.accesses = parse_number("day use", value)?,
            _ => {}
        }
    }

    Ok(records)
}

pub struct AttributeInspector<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> AttributeInspector<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    fn replica_instance(&self, name: &str, site: &Location) -> Result<Option<InstanceBlock>> {
        let listing = self.runner.run(&args![
            "listvol",
            "-server",
            site.server,
            "-partition",
            site.device(),
            "-format"
        ])?;
        let readonly = format!("{}.readonly", name);
        Ok(parse_records(&listing)?.into_iter().find(|r| r.name == readonly))
    }
}

impl<R: CommandRunner> CapacitySource for AttributeInspector<R> {
    fn partitions(&self, server: &str) -> Result<Vec<Partition>> {
        partitions_or_unreachable(server, self.runner.run(&args!["partinfo", "-server", server]))
    }
}

impl<R: CommandRunner> Inspector for AttributeInspector<R> {
    fn volume(&self, name: &str) -> Result<VolumeStatus> {
        let text = self
            .runner
            .run(&args!["examine", "-id", name, "-format"])
            .map_err(|err| missing_volume(name, err))?;

        let examined = parse_records(&text)?
            .into_iter()
            .find(|r| r.name == name)
            .ok_or_else(|| PlacementError::unparseable("examine output", format!("no record for {}", name)))?;
        let sites = parse_site_list(&text)?;

        assemble_status(examined, sites, |site| self.replica_instance(name, site))
    }
}

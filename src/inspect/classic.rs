//! Classic, human-oriented examine/listvol output.

use regex::Regex;
use std::sync::OnceLock;

use super::{
    assemble_status, missing_volume, parse_date, parse_number, parse_site_list, partitions_or_unreachable,
    InstanceBlock, InstanceRole, Inspector, VolumeStatus,
};
use crate::args;
use crate::error::{PlacementError, Result};
use crate::models::{normalize_partition, Location, Partition};
use crate::runner::CommandRunner;
use crate::selector::CapacitySource;

struct Patterns {
    header: Regex,
    location: Regex,
    last_update: Regex,
    accesses: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        header: Regex::new(r"^(\S+)\s+(\d+)\s+(RW|RO|BK)\s+(\d+)\s+K\b").expect("static pattern"),
        location: Regex::new(r"^\s+(\S+)\s+(/vicep[a-z]+)\s*$").expect("static pattern"),
        last_update: Regex::new(r"^\s*Last Update\s+(.*?)\s*$").expect("static pattern"),
        accesses: Regex::new(r"^\s*(\d+) accesses in the past day").expect("static pattern"),
    })
}

/// Split output into one block per volume header line
fn parse_blocks(text: &str) -> Result<Vec<InstanceBlock>> {
    let p = patterns();
    let mut blocks: Vec<InstanceBlock> = Vec::new();

    for line in text.lines() {
        if let Some(caps) = p.header.captures(line) {
            blocks.push(InstanceBlock {
                name: caps[1].to_string(),
                role: Some(InstanceRole::parse(&caps[3])?),
                size_kb: parse_number("volume size", &caps[4])?,
                ..Default::default()
            });
            continue;
        }

        // Lines before the first header carry nothing we use
        let Some(block) = blocks.last_mut() else {
            continue;
        };

        if let Some(caps) = p.location.captures(line) {
            if block.location.is_none() {
                block.location = Some(Location::new(&caps[1], normalize_partition(&caps[2])?));
            }
        } else if let Some(caps) = p.last_update.captures(line) {
            block.last_update = parse_date(&caps[1])?;
        } else if let Some(caps) = p.accesses.captures(line) {
            block.accesses = parse_number("access count", &caps[1])?;
        }
    }

    Ok(blocks)
}

pub struct ClassicInspector<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> ClassicInspector<R> {
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
            "-long"
        ])?;
        let readonly = format!("{}.readonly", name);
        Ok(parse_blocks(&listing)?.into_iter().find(|b| b.name == readonly))
    }
}

impl<R: CommandRunner> CapacitySource for ClassicInspector<R> {
    fn partitions(&self, server: &str) -> Result<Vec<Partition>> {
        partitions_or_unreachable(server, self.runner.run(&args!["partinfo", "-server", server]))
    }
}

impl<R: CommandRunner> Inspector for ClassicInspector<R> {
    fn volume(&self, name: &str) -> Result<VolumeStatus> {
        let text = self
            .runner
            .run(&args!["examine", "-id", name])
            .map_err(|err| missing_volume(name, err))?;

        let examined = parse_blocks(&text)?
            .into_iter()
            .find(|b| b.name == name)
            .ok_or_else(|| PlacementError::unparseable("examine output", format!("no header for {}", name)))?;
        let sites = parse_site_list(&text)?;

        assemble_status(examined, sites, |site| self.replica_instance(name, site))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::tests::CannedRunner;

    const EXAMINE: &str = "\
home.dave                         536870915 RW       2048 K  On-line
    fs1.example.com /vicepa
    RWrite  536870915 ROnly  536870916 Backup  536870917
    MaxQuota      50000 K
    Creation    Mon Jan  1 00:00:00 2024
    Copy        Mon Jan  1 00:00:00 2024
    Backup      Never
    Last Access Tue Jan  2 11:00:00 2024
    Last Update Tue Jan  2 10:00:00 2024
    12 accesses in the past day (i.e., vnode references)

    RWrite: 536870915     ROnly: 536870916     Backup: 536870917
    number of sites -> 2
       server fs1.example.com partition /vicepa RW Site
       server fs2.example.com partition /vicepb RO Site
";

    const LISTVOL: &str = "\
Total number of volumes on server fs2.example.com partition /vicepb: 2
other.vol.readonly                536870990 RO        100 K  On-line
    fs2.example.com /vicepb
    Last Update Mon Jan  1 09:00:00 2024
    0 accesses in the past day (i.e., vnode references)

home.dave.readonly                536870916 RO       2048 K  On-line
    fs2.example.com /vicepb
    Last Update Mon Jan  1 09:00:00 2024
    7 accesses in the past day (i.e., vnode references)
";

    #[test]
    fn test_examine_with_replica() {
        let runner = CannedRunner::default()
            .respond("examine -id home.dave", EXAMINE)
            .respond("listvol -server fs2.example.com -partition /vicepb -long", LISTVOL);
        let status = ClassicInspector::new(runner).volume("home.dave").unwrap();

        assert_eq!(status.role, InstanceRole::ReadWrite);
        assert_eq!(status.size_kb, 2048);
        assert_eq!(status.sites.len(), 2);

        let primary = &status.sites[0];
        assert_eq!(primary.location, Location::new("fs1.example.com", "a"));
        assert_eq!(primary.accesses, 12);

        let replica = &status.sites[1];
        assert_eq!(replica.location, Location::new("fs2.example.com", "b"));
        assert_eq!(replica.accesses, 7);
        assert!(replica.last_update < primary.last_update);
    }

    #[test]
    fn test_missing_volume() {
        let runner = CannedRunner::default().fail("examine -id nope", "VLDB: no such entry");
        let err = ClassicInspector::new(runner).volume("nope").unwrap_err();
        assert!(matches!(err, PlacementError::VolumeNotFound(ref v) if v == "nope"));
    }

    #[test]
    fn test_garbage_output_is_unparseable() {
        let runner = CannedRunner::default().respond("examine -id home.dave", "something went sideways\n");
        let err = ClassicInspector::new(runner).volume("home.dave").unwrap_err();
        assert!(matches!(err, PlacementError::Unparseable { .. }));
    }

    #[test]
    fn test_unreachable_server_lists_no_partitions() {
        let runner = CannedRunner::default().fail("partinfo -server fs9", "server fs9 unreachable");
        assert!(ClassicInspector::new(runner).partitions("fs9").unwrap().is_empty());
    }
}

//! Partition selection.
//!
//! A [`PartitionSpec`] names the partitions acceptable on one server; the
//! [`PartitionSelector`] turns it into a concrete partition by picking the
//! candidate with the most free space.

use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::OnceLock;

use crate::error::{PlacementError, Result};
use crate::models::{normalize_partition, Partition, PartitionId, ServerName, VolumeName};

/// Source of per-server partition capacity figures.
pub trait CapacitySource {
    /// Partitions of `server` in the server's own enumeration order
    fn partitions(&self, server: &str) -> Result<Vec<Partition>>;
}

/// Which partitions on a server are acceptable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionSpec {
    /// `.`: every partition on the server
    All,
    /// A single partition: `a` or `/vicepaa`
    Exact(PartitionId),
    /// Single-letter partitions given as a set of letters and ranges, e.g. `ace-gm`
    Letters { letters: BTreeSet<char>, raw: String },
}

fn letter_set_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(?:[a-z](?:-[a-z])?)+$").expect("static pattern"))
}

impl PartitionSpec {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw == "." {
            return Ok(PartitionSpec::All);
        }
        if raw.starts_with('/') {
            return normalize_partition(raw).map(PartitionSpec::Exact);
        }
        if !letter_set_pattern().is_match(raw) {
            return Err(PlacementError::InvalidPartitionSpec {
                volume: None,
                spec: raw.to_string(),
                reason: "expected `.`, a device path, or letters and letter ranges".into(),
            });
        }
        if raw.len() == 1 {
            return Ok(PartitionSpec::Exact(raw.to_string()));
        }

        let chars: Vec<char> = raw.chars().collect();
        let mut letters = BTreeSet::new();
        let mut i = 0;
        while i < chars.len() {
            if i + 2 < chars.len() && chars[i + 1] == '-' {
                let (start, end) = (chars[i], chars[i + 2]);
                if start > end {
                    return Err(PlacementError::InvalidPartitionSpec {
                        volume: None,
                        spec: raw.to_string(),
                        reason: format!("range {}-{} runs backwards", start, end),
                    });
                }
                letters.extend(start..=end);
                i += 3;
            } else {
                letters.insert(chars[i]);
                i += 1;
            }
        }

        Ok(PartitionSpec::Letters {
            letters,
            raw: raw.to_string(),
        })
    }

    pub fn matches(&self, partition: &str) -> bool {
        match self {
            PartitionSpec::All => true,
            PartitionSpec::Exact(id) => id == partition,
            PartitionSpec::Letters { letters, .. } => {
                let mut chars = partition.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => letters.contains(&c),
                    _ => false,
                }
            }
        }
    }
}

impl fmt::Display for PartitionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionSpec::All => f.write_str("."),
            PartitionSpec::Exact(id) => f.write_str(id),
            PartitionSpec::Letters { raw, .. } => f.write_str(raw),
        }
    }
}

/// Resolves partition specs against live capacity figures.
///
/// One selector serves one planning run: each server's listing is fetched at
/// most once and reused for the rest of the run.
pub struct PartitionSelector<'a, C: CapacitySource + ?Sized> {
    source: &'a C,
    volume: Option<VolumeName>,
    cache: HashMap<ServerName, Vec<Partition>>,
}

impl<'a, C: CapacitySource + ?Sized> PartitionSelector<'a, C> {
    pub fn new(source: &'a C) -> Self {
        Self {
            source,
            volume: None,
            cache: HashMap::new(),
        }
    }

    /// Name the volume being placed in selection errors
    pub fn for_volume(mut self, volume: &str) -> Self {
        self.volume = Some(volume.to_string());
        self
    }

    pub fn partitions(&mut self, server: &str) -> Result<&[Partition]> {
        if !self.cache.contains_key(server) {
            let listing = self.source.partitions(server)?;
            tracing::debug!(server, partitions = listing.len(), "fetched partition capacity");
            self.cache.insert(server.to_string(), listing);
        }
        Ok(self.cache.get(server).map(Vec::as_slice).unwrap_or_default())
    }

    /// Pick the matching partition with the most free space; ties go to the
    /// one listed first.
    pub fn select(&mut self, server: &str, spec: &PartitionSpec) -> Result<Partition> {
        let best = self
            .partitions(server)?
            .iter()
            .filter(|p| spec.matches(&p.id))
            .fold(None::<&Partition>, |best, candidate| match best {
                Some(b) if b.free_kb >= candidate.free_kb => Some(b),
                _ => Some(candidate),
            })
            .cloned();

        match best {
            Some(partition) => {
                tracing::debug!(server, spec = %spec, partition = %partition.id, free_kb = partition.free_kb, "selected partition");
                Ok(partition)
            }
            None => Err(PlacementError::NoCandidateFound {
                volume: self.volume.clone(),
                server: server.to_string(),
                spec: spec.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FixedCapacity {
        partitions: Vec<Partition>,
        calls: Cell<usize>,
    }

    impl CapacitySource for FixedCapacity {
        fn partitions(&self, server: &str) -> Result<Vec<Partition>> {
            self.calls.set(self.calls.get() + 1);
            Ok(self
                .partitions
                .iter()
                .filter(|p| p.server == server)
                .cloned()
                .collect())
        }
    }

    fn source() -> FixedCapacity {
        FixedCapacity {
            partitions: vec![
                Partition::new("fs1", "a", 400, 10_000),
                Partition::new("fs1", "b", 900, 10_000),
                Partition::new("fs1", "c", 900, 10_000),
                Partition::new("fs1", "g", 2_000, 10_000),
            ],
            calls: Cell::new(0),
        }
    }

    #[test]
    fn test_parse_specs() {
        assert_eq!(PartitionSpec::parse(".").unwrap(), PartitionSpec::All);
        assert_eq!(PartitionSpec::parse("a").unwrap(), PartitionSpec::Exact("a".into()));
        assert_eq!(PartitionSpec::parse("/vicepab").unwrap(), PartitionSpec::Exact("ab".into()));

        let spec = PartitionSpec::parse("ace-gm").unwrap();
        for letter in ["a", "c", "e", "f", "g", "m"] {
            assert!(spec.matches(letter), "{} should match", letter);
        }
        for letter in ["b", "d", "h", "ae"] {
            assert!(!spec.matches(letter), "{} should not match", letter);
        }
        assert_eq!(spec.to_string(), "ace-gm");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for raw in ["", "A", "a-", "-a", "g-c", "a b", "/vicep"] {
            let err = PartitionSpec::parse(raw).unwrap_err();
            assert!(err.is_input_error(), "{} should be an input error", raw);
        }
    }

    #[test]
    fn test_select_most_free() {
        let source = source();
        let mut selector = PartitionSelector::new(&source);
        let chosen = selector.select("fs1", &PartitionSpec::All).unwrap();
        assert_eq!(chosen.id, "g");
    }

    #[test]
    fn test_select_tie_goes_to_first_listed() {
        let source = source();
        let mut selector = PartitionSelector::new(&source);
        let chosen = selector.select("fs1", &PartitionSpec::parse("a-c").unwrap()).unwrap();
        assert_eq!(chosen.id, "b");
    }

    #[test]
    fn test_select_no_candidate() {
        let source = source();
        let mut selector = PartitionSelector::new(&source);
        let err = selector.select("fs1", &PartitionSpec::parse("x-z").unwrap()).unwrap_err();
        assert!(matches!(err, PlacementError::NoCandidateFound { .. }));

        // an unknown server lists nothing at all
        let err = selector.select("fs9", &PartitionSpec::All).unwrap_err();
        assert!(matches!(err, PlacementError::NoCandidateFound { .. }));
    }

    #[test]
    fn test_no_candidate_names_volume() {
        let source = source();
        let mut selector = PartitionSelector::new(&source).for_volume("home.dave");
        let err = selector.select("fs1", &PartitionSpec::parse("q").unwrap()).unwrap_err();
        assert!(matches!(err, PlacementError::NoCandidateFound { volume: Some(ref v), .. } if v == "home.dave"));
        assert_eq!(err.to_string(), "volume home.dave: no partition on server fs1 matches `q`");
    }

    #[test]
    fn test_server_listing_fetched_once() {
        let source = source();
        let mut selector = PartitionSelector::new(&source);
        selector.select("fs1", &PartitionSpec::All).unwrap();
        selector.select("fs1", &PartitionSpec::parse("a").unwrap()).unwrap();
        assert_eq!(source.calls.get(), 1);
    }
}

//! Timestamp grouping: partition the index into Work Units, one per acquisition date.

use log::warn;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::{Granule, WorkUnit};

/// Compare production ids numerically when both parse, else as strings.
fn cmp_production(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

/// True when `candidate` should replace `current` for the same (timestamp, tile):
/// higher collection wins, then higher production id.
pub fn supersedes(candidate: &Granule, current: &Granule) -> bool {
    match candidate.collection.cmp(&current.collection) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => cmp_production(&candidate.production, &current.production).is_gt(),
    }
}

/// Group granules by timestamp key. Units are sorted ascending by key, granules within a unit by
/// tile. Duplicate granules for one tile keep only the winner of [`supersedes`]. `limit` keeps the
/// first N units (smoke runs). The result does not depend on the order of `granules`.
pub fn group_work_units(granules: &[Granule], limit: Option<usize>) -> Vec<WorkUnit> {
    let mut by_key: BTreeMap<&str, BTreeMap<&str, &Granule>> = BTreeMap::new();
    for g in granules {
        let tiles = by_key.entry(g.timestamp_key.as_str()).or_default();
        match tiles.get(g.tile.as_str()) {
            None => {
                tiles.insert(g.tile.as_str(), g);
            }
            Some(current) => {
                // Identical versions: lower path wins so the choice is order-independent.
                let replace = supersedes(g, current)
                    || (!supersedes(current, g) && g.path < current.path);
                let (kept, dropped) = if replace { (g, *current) } else { (*current, g) };
                warn!(
                    "{} {}: using production {} (collection {}), ignoring {}",
                    g.timestamp_key,
                    g.tile,
                    kept.production,
                    kept.collection,
                    dropped.path.display()
                );
                if replace {
                    tiles.insert(g.tile.as_str(), g);
                }
            }
        }
    }

    let units = by_key.into_iter().map(|(key, tiles)| WorkUnit {
        timestamp_key: key.to_string(),
        granules: tiles.into_values().cloned().collect(),
    });
    match limit {
        Some(n) => units.take(n).collect(),
        None => units.collect(),
    }
}

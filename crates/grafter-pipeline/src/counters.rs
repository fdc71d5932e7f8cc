//! Named stage counters.
//!
//! Reducers on different workers bump the same counter set concurrently; a run
//! report takes a snapshot at the end.

use dashmap::DashMap;
use std::collections::BTreeMap;

pub const RECORDS_READ: &str = "records.read";
pub const RECORDS_UNPARSEABLE: &str = "records.unparseable";
pub const VERTICES_EMITTED: &str = "merge.vertices_emitted";
pub const EDGES_EMITTED: &str = "merge.edges_emitted";
pub const DUPLICATE_VERTICES: &str = "merge.duplicate_vertices";
pub const DUPLICATE_EDGES: &str = "merge.duplicate_edges";
pub const SELF_LOOPS_DROPPED: &str = "merge.self_loops_dropped";
pub const REVERSE_EDGES_DROPPED: &str = "merge.reverse_edges_dropped";
pub const PAYLOADS_REJECTED: &str = "merge.payloads_rejected";
pub const IDS_ASSIGNED: &str = "hash_id.ids_assigned";
pub const ID_PARSE_ERRORS: &str = "hash_id.parse_errors";
pub const DICTIONARY_ENTRIES: &str = "dictionary.entries";
pub const DICTIONARY_DUPLICATES: &str = "dictionary.duplicate_entries";
pub const DICTIONARY_BAD_LINES: &str = "dictionary.bad_lines";
pub const SHARD_LOADS: &str = "join.shard_loads";
pub const RESOLVED: &str = "join.resolved";
pub const RESOLUTION_MISSES: &str = "join.misses";
pub const EDGE_PARSE_ERRORS: &str = "join.parse_errors";
pub const STORE_VERTICES: &str = "sink.vertices_inserted";
pub const STORE_EDGES: &str = "sink.edges_inserted";
pub const STORE_RESERVED_PROPS: &str = "sink.reserved_props_dropped";
pub const STORE_COMMITS: &str = "sink.commits";

/// Thread-safe set of named `u64` counters.
#[derive(Debug, Default)]
pub struct Counters {
    values: DashMap<&'static str, u64>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&self, name: &'static str, by: u64) {
        if by == 0 {
            return;
        }
        *self.values.entry(name).or_insert(0) += by;
    }

    pub fn get(&self, name: &str) -> u64 {
        self.values.get(name).map(|v| *v).unwrap_or(0)
    }

    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.values
            .iter()
            .map(|entry| (entry.key().to_string(), *entry.value()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn concurrent_increments_add_up() {
        let counters = Counters::new();
        (0..1000).into_par_iter().for_each(|_| counters.incr(RESOLVED, 1));
        assert_eq!(counters.get(RESOLVED), 1000);
        assert_eq!(counters.get(RESOLUTION_MISSES), 0);
        assert_eq!(counters.snapshot().get(RESOLVED), Some(&1000));
    }
}

//! Edge endpoint rewriting ("SortEdge" then "TransEdge").
//!
//! ```text
//!   srcRaw  \t dstRaw \t edgeData   --pass 1, keyed by srcRaw-->
//!   srcSurr \t dstRaw \t edgeData   --pass 2, keyed by dstRaw-->
//!   srcSurr \t dstSurr\t edgeData
//! ```
//!
//! Each pass groups edges by the raw id being resolved, so a worker needs only
//! the dictionary shard of its own partition.

use super::{JoinState, LookupProvider, ShardFileLookup};
use crate::counters::{self, Counters};
use crate::dictionary::{ShardKey, ShardManifest};
use crate::error::Result;
use crate::partition::PartitionHasher;
use crate::substrate::{Reducer, Substrate};
use grafter_model::EdgeLine;
use std::path::{Path, PathBuf};

/// Which edge field a pass resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Source,
    Target,
}

impl Endpoint {
    pub fn pass_name(self) -> &'static str {
        match self {
            Endpoint::Source => "sort_edge",
            Endpoint::Target => "trans_edge",
        }
    }

    fn field<'a>(self, line: &EdgeLine<'a>) -> &'a str {
        match self {
            Endpoint::Source => line.src,
            Endpoint::Target => line.dst,
        }
    }

    fn rewrite(self, line: &EdgeLine<'_>, resolved: u64) -> String {
        let resolved = resolved.to_string();
        match self {
            Endpoint::Source => EdgeLine::format(&resolved, line.dst, line.data),
            Endpoint::Target => EdgeLine::format(line.src, &resolved, line.data),
        }
    }
}

/// Rewrites both endpoints of every edge line through a `raw_id` sharded
/// dictionary.
pub struct EdgeRepartitionJoin<'a> {
    dictionary: PathBuf,
    counters: &'a Counters,
}

impl<'a> EdgeRepartitionJoin<'a> {
    pub fn new(dictionary: impl Into<PathBuf>, counters: &'a Counters) -> Self {
        Self {
            dictionary: dictionary.into(),
            counters,
        }
    }

    /// Fail unless the dictionary exists, is keyed by raw id, and has one
    /// shard per substrate partition.
    pub fn check<S: Substrate>(&self, substrate: &S) -> Result<ShardManifest> {
        let manifest = ShardManifest::read(&self.dictionary)?;
        manifest.check(&self.dictionary, ShardKey::RawId, substrate.partitions())?;
        Ok(manifest)
    }

    /// Both passes. Edges with an unresolvable endpoint are dropped.
    pub fn run<S: Substrate>(&self, substrate: &S, edges: Vec<String>) -> Result<Vec<String>> {
        self.check(substrate)?;
        let half = self.pass(substrate, Endpoint::Source, edges)?;
        let resolved = self.pass(substrate, Endpoint::Target, half)?;
        tracing::info!(
            edges = resolved.len(),
            misses = self.counters.get(counters::RESOLUTION_MISSES),
            shard_loads = self.counters.get(counters::SHARD_LOADS),
            "rewrote edge endpoints"
        );
        Ok(resolved)
    }

    /// One pass, resolving `endpoint` of every line. Callers running a single
    /// pass should [`check`](Self::check) the dictionary first.
    pub fn pass<S: Substrate>(
        &self,
        substrate: &S,
        endpoint: Endpoint,
        lines: Vec<String>,
    ) -> Result<Vec<String>> {
        let counters = self.counters;
        let hasher = substrate.hasher();
        let out = substrate.run_pass(
            endpoint.pass_name(),
            lines,
            |line, emit| {
                match EdgeLine::split(&line) {
                    Ok(fields) => {
                        let key = endpoint.field(&fields).to_string();
                        emit.emit(key, line);
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, record = %line, "skipping unparseable edge line");
                        counters.incr(counters::EDGE_PARSE_ERRORS, 1);
                    }
                }
                Ok(())
            },
            |_partition| {
                Ok(EndpointResolver {
                    endpoint,
                    hasher,
                    dictionary: &self.dictionary,
                    state: JoinState::new(ShardFileLookup::surrogates(counters), counters),
                })
            },
        )?;
        Ok(out.into_iter().flatten().collect())
    }
}

struct EndpointResolver<'a> {
    endpoint: Endpoint,
    hasher: PartitionHasher,
    dictionary: &'a Path,
    state: JoinState<'a, ShardFileLookup<'a, u64>>,
}

impl Reducer for EndpointResolver<'_> {
    type Key = String;
    type Value = String;
    type Output = String;

    fn reduce(&mut self, key: String, lines: Vec<String>, out: &mut Vec<String>) -> Result<()> {
        let bucket = self.hasher.bucket(key.as_str());
        self.state.ensure_loaded(&bucket, self.dictionary)?;
        let first = lines.first().map(String::as_str).unwrap_or_default();
        let Some(resolved) = self.state.resolve(key.as_str(), first, lines.len() as u64) else {
            return Ok(());
        };
        for line in &lines {
            // Lines were split once on the map side.
            if let Ok(fields) = EdgeLine::split(line) {
                out.push(self.endpoint.rewrite(&fields, resolved));
            }
        }
        Ok(())
    }

    fn finish(&mut self, _out: &mut Vec<String>) -> Result<()> {
        tracing::debug!(
            pass = self.endpoint.pass_name(),
            loads = self.state.loads(),
            resident = self.state.provider().len(),
            "resolver finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::DictionaryShardBuilder;
    use crate::error::PipelineError;
    use crate::substrate::LocalSubstrate;
    use grafter_model::{DictionaryEntry, ResolvedEdge};

    const DATA: &str = "{\"label\":\"e\",\"props\":{}}";

    fn setup(partitions: usize, names: &[&str]) -> (tempfile::TempDir, LocalSubstrate) {
        let dir = tempfile::tempdir().unwrap();
        let substrate = LocalSubstrate::new(partitions, 2).unwrap();
        let entries = names
            .iter()
            .enumerate()
            .map(|(i, n)| DictionaryEntry::new(i as u64, *n))
            .collect();
        DictionaryShardBuilder::new(ShardKey::RawId)
            .build(&substrate, entries, &dir.path().join("dict"), &Counters::new())
            .unwrap();
        (dir, substrate)
    }

    fn edge(src: &str, dst: &str) -> String {
        EdgeLine::format(src, dst, DATA)
    }

    #[test]
    fn both_endpoints_are_rewritten() {
        let (dir, substrate) = setup(4, &["a", "b", "c"]);
        let counters = Counters::new();
        let join = EdgeRepartitionJoin::new(dir.path().join("dict"), &counters);
        let mut out = join
            .run(&substrate, vec![edge("a", "b"), edge("c", "a"), edge("b", "c")])
            .unwrap();
        out.sort();
        let parsed: Vec<(u64, u64)> = out
            .iter()
            .map(|l| ResolvedEdge::parse(l).unwrap())
            .map(|e| (e.src, e.dst))
            .collect();
        assert_eq!(parsed, vec![(0, 1), (1, 2), (2, 0)]);
        assert_eq!(counters.get(counters::RESOLVED), 6);
    }

    #[test]
    fn dangling_target_drops_only_that_edge() {
        let (dir, substrate) = setup(2, &["a", "b"]);
        let counters = Counters::new();
        let join = EdgeRepartitionJoin::new(dir.path().join("dict"), &counters);
        let out = join
            .run(&substrate, vec![edge("a", "b"), edge("a", "ghost")])
            .unwrap();
        assert_eq!(out, vec![EdgeLine::format("0", "1", DATA)]);
        assert_eq!(counters.get(counters::RESOLUTION_MISSES), 1);
    }

    #[test]
    fn source_pass_keeps_target_raw() {
        let (dir, substrate) = setup(3, &["a", "b"]);
        let counters = Counters::new();
        let join = EdgeRepartitionJoin::new(dir.path().join("dict"), &counters);
        let half = join.pass(&substrate, Endpoint::Source, vec![edge("b", "a")]).unwrap();
        assert_eq!(half, vec![EdgeLine::format("1", "a", DATA)]);
    }

    #[test]
    fn each_partition_loads_its_shard_once() {
        let names: Vec<String> = (0..40).map(|i| format!("n{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let (dir, substrate) = setup(4, &refs);
        let edges: Vec<String> = (0..40).map(|i| edge(&names[i], &names[(i * 7 + 3) % 40])).collect();
        let counters = Counters::new();
        let join = EdgeRepartitionJoin::new(dir.path().join("dict"), &counters);
        let out = join.pass(&substrate, Endpoint::Source, edges).unwrap();
        assert_eq!(out.len(), 40);
        assert!(counters.get(counters::SHARD_LOADS) <= 4);
    }

    #[test]
    fn misaligned_dictionary_fails_before_any_pass() {
        let (dir, _) = setup(4, &["a"]);
        let eight = LocalSubstrate::new(8, 2).unwrap();
        let counters = Counters::new();
        let join = EdgeRepartitionJoin::new(dir.path().join("dict"), &counters);
        let err = join.run(&eight, vec![edge("a", "a")]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ShardCountMismatch { dictionary: 4, partitions: 8 }
        ));
        assert_eq!(counters.get(counters::SHARD_LOADS), 0);
    }

    #[test]
    fn bad_lines_are_counted() {
        let (dir, substrate) = setup(2, &["a", "b"]);
        let counters = Counters::new();
        let join = EdgeRepartitionJoin::new(dir.path().join("dict"), &counters);
        let out = join
            .run(&substrate, vec!["a\tb".to_string(), edge("a", "b")])
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(counters.get(counters::EDGE_PARSE_ERRORS), 1);
    }
}

//! Pipeline configuration.

use crate::combine::ReducerRegistry;
use crate::dictionary::ShardKey;
use crate::error::{ConfigError, PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration shared by every stage of one run.
///
/// Values are fixed for the lifetime of a run; in particular every stage that
/// must align partitions sees the same `partitions` value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of shuffle partitions (reduce tasks) per pass.
    pub partitions: usize,
    /// Number of dictionary shard files. Must equal `partitions`.
    pub dictionary_shards: usize,
    /// Direction the dictionary is sharded by.
    pub dictionary_key: ShardKey,
    /// Upper bound on vertex records per id-assignment shard; also the stride
    /// between shard id ranges.
    pub lines_per_shard: u64,
    /// Drop one direction of every `(a,b,l)` / `(b,a,l)` pair.
    pub clean_bidirectional: bool,
    /// Registry name of the vertex property combine function.
    pub vertex_combiner: Option<String>,
    /// Registry name of the edge property combine function.
    pub edge_combiner: Option<String>,
    /// Store writes per commit in the sink pipeline.
    pub commit_batch: usize,
    /// Worker threads for the local substrate.
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            partitions: 8,
            dictionary_shards: 8,
            dictionary_key: ShardKey::RawId,
            lines_per_shard: 100_000,
            clean_bidirectional: false,
            vertex_combiner: None,
            edge_combiner: None,
            commit_batch: 1_000,
            workers: 4,
        }
    }
}

impl PipelineConfig {
    /// Same partition count for the shuffle and the dictionary.
    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions;
        self.dictionary_shards = partitions;
        self
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let config: Self = serde_json::from_str(&text).map_err(|e| ConfigError::InvalidFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(config)
    }

    /// Reject inconsistent settings before any record is processed.
    pub fn validate(&self, registry: &ReducerRegistry) -> Result<()> {
        if self.partitions == 0 || self.partitions > i32::MAX as usize {
            return Err(ConfigError::InvalidPartitions(self.partitions).into());
        }
        if self.dictionary_shards != self.partitions {
            return Err(PipelineError::ShardCountMismatch {
                dictionary: self.dictionary_shards,
                partitions: self.partitions,
            });
        }
        if self.lines_per_shard == 0 {
            return Err(ConfigError::ZeroLinesPerShard.into());
        }
        if self.commit_batch == 0 {
            return Err(ConfigError::ZeroCommitBatch.into());
        }
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers.into());
        }
        for name in [&self.vertex_combiner, &self.edge_combiner]
            .into_iter()
            .flatten()
        {
            registry.create(name)?;
        }
        Ok(())
    }
}

//! Shared command-line options.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use grafter_ingest_text::TokenizerRegistry;
use grafter_model::Tokenizer;
use grafter_pipeline::{PipelineConfig, ShardKey};
use std::path::PathBuf;
use std::sync::Arc;

/// Pipeline settings. Flags override values read from `--config`.
#[derive(Args, Debug, Default)]
pub struct PipelineArgs {
    /// JSON pipeline config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Shuffle partitions; also sets the dictionary shard count
    #[arg(long, global = true)]
    pub partitions: Option<usize>,

    /// Dictionary shard count, when it must differ from `--partitions`
    #[arg(long, global = true)]
    pub dictionary_shards: Option<usize>,

    /// Maximum vertex records per id-assignment shard
    #[arg(long, global = true)]
    pub lines_per_shard: Option<u64>,

    /// Worker threads
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Drop one direction of every bidirectional edge pair
    #[arg(long, global = true)]
    pub clean_bidirectional: bool,

    /// Combine function for vertex properties
    #[arg(long, global = true)]
    pub vertex_combiner: Option<String>,

    /// Combine function for edge properties
    #[arg(long, global = true)]
    pub edge_combiner: Option<String>,

    /// Store writes per commit (`load`)
    #[arg(long, global = true)]
    pub commit_batch: Option<usize>,
}

impl PipelineArgs {
    pub fn resolve(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(partitions) = self.partitions {
            config = config.with_partitions(partitions);
        }
        if let Some(shards) = self.dictionary_shards {
            config.dictionary_shards = shards;
        }
        if let Some(lines) = self.lines_per_shard {
            config.lines_per_shard = lines;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if self.clean_bidirectional {
            config.clean_bidirectional = true;
        }
        if let Some(name) = &self.vertex_combiner {
            config.vertex_combiner = Some(name.clone());
        }
        if let Some(name) = &self.edge_combiner {
            config.edge_combiner = Some(name.clone());
        }
        if let Some(batch) = self.commit_batch {
            config.commit_batch = batch;
        }
        Ok(config)
    }
}

/// Raw record input.
#[derive(Args, Debug)]
pub struct InputArgs {
    /// Record file, or a directory of record files
    pub input: PathBuf,

    /// Record format (`tsv`, `jsonl`); inferred from the extension when omitted
    #[arg(long)]
    pub format: Option<String>,
}

impl InputArgs {
    pub fn tokenizer(&self) -> Result<Arc<dyn Tokenizer>> {
        let registry = TokenizerRegistry::builtin();
        let tokenizer = match &self.format {
            Some(name) => registry.create(name)?,
            None => registry
                .for_path(&self.input)
                .context("pass --format to name the record format")?,
        };
        Ok(tokenizer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeyArg {
    RawId,
    SurrogateId,
}

impl From<KeyArg> for ShardKey {
    fn from(key: KeyArg) -> Self {
        match key {
            KeyArg::RawId => ShardKey::RawId,
            KeyArg::SurrogateId => ShardKey::SurrogateId,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grafter.json");
        std::fs::write(&path, r#"{"partitions": 2, "dictionary_shards": 2, "workers": 1}"#).unwrap();

        let args = PipelineArgs {
            config: Some(path),
            partitions: Some(6),
            clean_bidirectional: true,
            ..PipelineArgs::default()
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.partitions, 6);
        assert_eq!(config.dictionary_shards, 6);
        assert_eq!(config.workers, 1);
        assert!(config.clean_bidirectional);
    }

    #[test]
    fn explicit_shard_count_survives_partition_flag() {
        let args = PipelineArgs {
            partitions: Some(8),
            dictionary_shards: Some(4),
            ..PipelineArgs::default()
        };
        let config = args.resolve().unwrap();
        assert_eq!((config.partitions, config.dictionary_shards), (8, 4));
    }
}

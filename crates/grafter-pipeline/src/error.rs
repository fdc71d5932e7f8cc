//! Pipeline errors and process exit statuses.
//!
//! Only fatal conditions are errors here. Malformed records and unresolved
//! references are logged, counted and skipped where they occur.

use grafter_model::StoreError;
use std::path::PathBuf;

/// Inconsistent or unusable configuration, detected before records flow.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("partition count must be at least 1 (got {0})")]
    InvalidPartitions(usize),

    #[error("lines_per_shard must be at least 1")]
    ZeroLinesPerShard,

    #[error("commit_batch must be at least 1")]
    ZeroCommitBatch,

    #[error("workers must be at least 1")]
    ZeroWorkers,

    #[error("shard {shard} holds more than {limit} vertex records; ids would collide")]
    ShardTooLarge { shard: u64, limit: u64 },

    #[error("surrogate id space exhausted at shard {shard}")]
    IdSpaceExhausted { shard: u64 },

    #[error("unknown combine function '{name}' (known: {known})")]
    UnknownCombiner { name: String, known: String },

    #[error("dictionary under {} is keyed by {found}, expected {expected}", dir.display())]
    WrongDictionaryKey {
        dir: PathBuf,
        found: &'static str,
        expected: &'static str,
    },

    #[error("output directory {} already holds part files", .0.display())]
    OutputExists(PathBuf),

    #[error("invalid config file {}: {reason}", path.display())]
    InvalidFile { path: PathBuf, reason: String },

    #[error("worker pool: {0}")]
    WorkerPool(String),
}

/// Any fatal pipeline failure.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("dictionary has {dictionary} shards but edges are split into {partitions} partitions")]
    ShardCountMismatch { dictionary: usize, partitions: usize },

    #[error("missing dictionary under {}{}", dir.display(), bucket.map(|b| format!(" (shard {b})")).unwrap_or_default())]
    MissingDictionary { dir: PathBuf, bucket: Option<usize> },

    #[error("dictionary conflict: '{key}' maps to both {first} and {second}")]
    DictionaryConflict {
        key: String,
        first: String,
        second: String,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn exit_status(&self) -> ExitStatus {
        match self {
            PipelineError::Config(_) => ExitStatus::Config,
            PipelineError::ShardCountMismatch { .. } => ExitStatus::ShardMismatch,
            PipelineError::MissingDictionary { .. } => ExitStatus::MissingDictionary,
            PipelineError::DictionaryConflict { .. } => ExitStatus::DictionaryConflict,
            PipelineError::Store(_) => ExitStatus::Store,
            PipelineError::Io { .. } => ExitStatus::Io,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_status().code()
    }
}

/// Process exit statuses, one per fatal error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    Success,
    Unknown,
    Config,
    ShardMismatch,
    MissingDictionary,
    DictionaryConflict,
    Store,
    Io,
}

impl ExitStatus {
    pub const fn code(self) -> u8 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Unknown => 1,
            ExitStatus::Config => 2,
            ExitStatus::ShardMismatch => 3,
            ExitStatus::MissingDictionary => 4,
            ExitStatus::DictionaryConflict => 5,
            ExitStatus::Store => 6,
            ExitStatus::Io => 7,
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn exit_codes_are_distinct() {
        let all = [
            ExitStatus::Success,
            ExitStatus::Unknown,
            ExitStatus::Config,
            ExitStatus::ShardMismatch,
            ExitStatus::MissingDictionary,
            ExitStatus::DictionaryConflict,
            ExitStatus::Store,
            ExitStatus::Io,
        ];
        let codes: HashSet<u8> = all.iter().map(|s| s.code()).collect();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn mismatch_maps_to_its_own_status() {
        let err = PipelineError::ShardCountMismatch {
            dictionary: 4,
            partitions: 8,
        };
        assert_eq!(err.exit_status(), ExitStatus::ShardMismatch);
        assert!(err.to_string().contains("4 shards"));
    }
}

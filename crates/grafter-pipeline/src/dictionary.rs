//! Sharded raw-id ↔ surrogate-id dictionary ("SortDict").
//!
//! The builder repartitions dictionary entries by the hash of one of their
//! two columns and writes one shard file per bucket:
//!
//! ```text
//! <dir>/_SHARDS             manifest (shard count, key column, entries)
//! <dir>/shard<k>-r-<k:05>   lines "surrogateId \t rawId" with bucket(key) == k
//! ```
//!
//! Shards are written in full before any join opens them and are never
//! mutated afterwards. A reader finds the files of bucket `k` by listing the
//! directory and matching the `shard<k>-` prefix.

use crate::counters::{self, Counters};
use crate::error::{ConfigError, PipelineError, Result};
use crate::io;
use crate::substrate::{Reducer, Substrate};
use ahash::AHashMap;
use grafter_model::DictionaryEntry;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::hash::Hash;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "_SHARDS";

/// Which column a dictionary is sharded (and looked up) by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardKey {
    /// Bucket by `hash(rawId)`; resolves raw ids to surrogates.
    #[default]
    RawId,
    /// Bucket by `hash(surrogateId)` over its decimal text; resolves
    /// surrogates back to raw ids.
    SurrogateId,
}

impl ShardKey {
    pub fn as_str(self) -> &'static str {
        match self {
            ShardKey::RawId => "raw_id",
            ShardKey::SurrogateId => "surrogate_id",
        }
    }

    /// The text of `entry` that is hashed and looked up under this key.
    pub fn key_of(self, entry: &DictionaryEntry) -> String {
        match self {
            ShardKey::RawId => entry.raw_id.clone(),
            ShardKey::SurrogateId => entry.surrogate.to_string(),
        }
    }
}

/// Contents of the `_SHARDS` manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardManifest {
    pub shards: usize,
    pub key: ShardKey,
    pub entries: u64,
}

impl ShardManifest {
    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let file = File::open(&path).map_err(|_| PipelineError::MissingDictionary {
            dir: dir.to_path_buf(),
            bucket: None,
        })?;
        serde_json::from_reader(file).map_err(|e| {
            ConfigError::InvalidFile {
                path,
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn write(&self, dir: &Path) -> Result<()> {
        let path = dir.join(MANIFEST_FILE);
        let file = File::create(&path).map_err(|e| PipelineError::io(&path, e))?;
        serde_json::to_writer_pretty(file, self).map_err(|e| {
            PipelineError::io(&path, std::io::Error::new(std::io::ErrorKind::Other, e))
        })
    }

    /// Fail unless this dictionary can serve lookups of `key` over
    /// `partitions` partitions.
    pub fn check(&self, dir: &Path, key: ShardKey, partitions: usize) -> Result<()> {
        if self.key != key {
            return Err(ConfigError::WrongDictionaryKey {
                dir: dir.to_path_buf(),
                found: self.key.as_str(),
                expected: key.as_str(),
            }
            .into());
        }
        if self.shards != partitions {
            return Err(PipelineError::ShardCountMismatch {
                dictionary: self.shards,
                partitions,
            });
        }
        Ok(())
    }
}

pub fn shard_prefix(bucket: usize) -> String {
    format!("shard{bucket}-")
}

pub fn shard_file_name(bucket: usize) -> String {
    io::part_file_name(&format!("shard{bucket}"), bucket)
}

// ============================================================================
// Building
// ============================================================================

pub struct DictionaryShardBuilder {
    key: ShardKey,
}

impl DictionaryShardBuilder {
    pub fn new(key: ShardKey) -> Self {
        Self { key }
    }

    /// Shard `entries` into `dir`, one file per substrate partition.
    ///
    /// Every bucket gets a file, possibly empty, so a missing file always
    /// means a missing dictionary.
    pub fn build<S: Substrate>(
        &self,
        substrate: &S,
        entries: Vec<DictionaryEntry>,
        dir: &Path,
        counters: &Counters,
    ) -> Result<ShardManifest> {
        io::prepare_output_dir(dir)?;
        let key = self.key;

        let written = substrate.run_pass(
            "sort_dict",
            entries,
            |entry, emit| {
                emit.emit(key.key_of(&entry), entry);
                Ok(())
            },
            |bucket| ShardWriter::open(dir, bucket, key, counters),
        )?;

        let shards = substrate.partitions();
        for bucket in 0..shards {
            let path = dir.join(shard_file_name(bucket));
            if !path.exists() {
                File::create(&path).map_err(|e| PipelineError::io(&path, e))?;
            }
        }

        let manifest = ShardManifest {
            shards,
            key,
            entries: written.iter().flatten().sum(),
        };
        manifest.write(dir)?;
        tracing::info!(
            dir = %dir.display(),
            shards,
            key = key.as_str(),
            entries = manifest.entries,
            "wrote dictionary shards"
        );
        Ok(manifest)
    }
}

/// Reducer owning one shard file.
struct ShardWriter<'a> {
    key: ShardKey,
    path: PathBuf,
    lines: Vec<String>,
    counters: &'a Counters,
}

impl<'a> ShardWriter<'a> {
    fn open(dir: &Path, bucket: usize, key: ShardKey, counters: &'a Counters) -> Result<Self> {
        Ok(Self {
            key,
            path: dir.join(shard_file_name(bucket)),
            lines: Vec::new(),
            counters,
        })
    }
}

impl Reducer for ShardWriter<'_> {
    type Key = String;
    type Value = DictionaryEntry;
    type Output = u64;

    fn reduce(&mut self, key: String, values: Vec<DictionaryEntry>, _out: &mut Vec<u64>) -> Result<()> {
        let mut values = values.into_iter();
        let Some(first) = values.next() else {
            return Ok(());
        };
        for other in values {
            if other != first {
                let (a, b) = match self.key {
                    ShardKey::RawId => (first.surrogate.to_string(), other.surrogate.to_string()),
                    ShardKey::SurrogateId => (first.raw_id.clone(), other.raw_id.clone()),
                };
                return Err(PipelineError::DictionaryConflict {
                    key,
                    first: a,
                    second: b,
                });
            }
            self.counters.incr(counters::DICTIONARY_DUPLICATES, 1);
        }
        self.lines.push(first.to_line());
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<u64>) -> Result<()> {
        let written = io::write_lines(&self.path, &self.lines)?;
        self.counters.incr(counters::DICTIONARY_ENTRIES, written);
        out.push(written);
        Ok(())
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Load the shard of `bucket` as a map from key text to the other column.
///
/// Malformed lines are logged and skipped; two different values for one key
/// are a fatal conflict.
pub fn load_shard<V, F>(dir: &Path, bucket: usize, key: ShardKey, counters: &Counters, value: F) -> Result<AHashMap<String, V>>
where
    V: Clone + PartialEq + Hash + std::fmt::Display,
    F: Fn(DictionaryEntry) -> V,
{
    let files = io::files_with_prefix(dir, &shard_prefix(bucket))?;
    if files.is_empty() {
        return Err(PipelineError::MissingDictionary {
            dir: dir.to_path_buf(),
            bucket: Some(bucket),
        });
    }

    let mut table: AHashMap<String, V> = AHashMap::new();
    for file in files {
        for line in io::read_lines(&file)? {
            let entry = match DictionaryEntry::parse(&line) {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(file = %file.display(), error = %err, line = %line, "skipping malformed dictionary line");
                    counters.incr(counters::DICTIONARY_BAD_LINES, 1);
                    continue;
                }
            };
            let k = key.key_of(&entry);
            let v = value(entry);
            match table.get(&k) {
                Some(existing) if *existing != v => {
                    return Err(PipelineError::DictionaryConflict {
                        key: k,
                        first: existing.to_string(),
                        second: v.to_string(),
                    });
                }
                Some(_) => {}
                None => {
                    table.insert(k, v);
                }
            }
        }
    }
    Ok(table)
}

use super::LookupProvider;
use crate::counters::Counters;
use crate::dictionary::{load_shard, ShardKey};
use crate::error::Result;
use ahash::AHashMap;
use grafter_model::DictionaryEntry;
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::path::Path;

/// Looks keys up in one dictionary shard file at a time.
///
/// The token is the bucket number; the source is the dictionary directory.
pub struct ShardFileLookup<'c, V> {
    key: ShardKey,
    value: fn(DictionaryEntry) -> V,
    table: AHashMap<String, V>,
    counters: &'c Counters,
}

impl<'c> ShardFileLookup<'c, u64> {
    /// Raw id → surrogate id, over a `raw_id` sharded dictionary.
    pub fn surrogates(counters: &'c Counters) -> Self {
        Self::new(ShardKey::RawId, |entry| entry.surrogate, counters)
    }
}

impl<'c> ShardFileLookup<'c, String> {
    /// Surrogate id (decimal text) → raw id, over a `surrogate_id` sharded
    /// dictionary.
    pub fn raw_ids(counters: &'c Counters) -> Self {
        Self::new(ShardKey::SurrogateId, |entry| entry.raw_id, counters)
    }
}

impl<'c, V> ShardFileLookup<'c, V> {
    fn new(key: ShardKey, value: fn(DictionaryEntry) -> V, counters: &'c Counters) -> Self {
        Self {
            key,
            value,
            table: AHashMap::new(),
            counters,
        }
    }

    pub fn shard_key(&self) -> ShardKey {
        self.key
    }
}

impl<V> LookupProvider for ShardFileLookup<'_, V>
where
    V: Clone + PartialEq + Hash + Display + Debug,
{
    type Token = usize;
    type Key = str;
    type Id = V;
    type Source<'s> = &'s Path;

    fn load(&mut self, bucket: &usize, dir: &Path) -> Result<()> {
        self.table.clear();
        self.table = load_shard(dir, *bucket, self.key, self.counters, self.value)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Option<V> {
        self.table.get(key).cloned()
    }

    fn len(&self) -> usize {
        self.table.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::DictionaryShardBuilder;
    use crate::substrate::{LocalSubstrate, Substrate};

    #[test]
    fn both_directions_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let substrate = LocalSubstrate::new(3, 1).unwrap();
        let counters = Counters::new();
        let entries: Vec<_> = (0..12).map(|i| DictionaryEntry::new(100 + i, format!("r{i}"))).collect();
        let forward = dir.path().join("fwd");
        let backward = dir.path().join("bwd");
        DictionaryShardBuilder::new(ShardKey::RawId)
            .build(&substrate, entries.clone(), &forward, &counters)
            .unwrap();
        DictionaryShardBuilder::new(ShardKey::SurrogateId)
            .build(&substrate, entries, &backward, &counters)
            .unwrap();

        let mut surrogates = ShardFileLookup::surrogates(&counters);
        surrogates.load(&substrate.hasher().bucket("r5"), &forward).unwrap();
        assert_eq!(surrogates.get("r5"), Some(105));

        let mut raw = ShardFileLookup::raw_ids(&counters);
        raw.load(&substrate.hasher().bucket("105"), &backward).unwrap();
        assert_eq!(raw.get("105").as_deref(), Some("r5"));
        assert_eq!(raw.shard_key(), ShardKey::SurrogateId);
    }

    #[test]
    fn reload_replaces_the_table() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("shard0-r-00000"), "1\ta\n2\tb\n").unwrap();
        std::fs::write(dir.path().join("shard1-r-00001"), "3\tc\n").unwrap();
        let counters = Counters::new();
        let mut lookup = ShardFileLookup::surrogates(&counters);
        lookup.load(&0, dir.path()).unwrap();
        assert_eq!(lookup.len(), 2);
        lookup.load(&1, dir.path()).unwrap();
        assert_eq!(lookup.len(), 1);
        assert_eq!(lookup.get("a"), None);
        assert_eq!(lookup.get("c"), Some(3));
    }
}

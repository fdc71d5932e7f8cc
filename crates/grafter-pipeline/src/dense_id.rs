//! Dense surrogate-id assignment ("HashId").
//!
//! Each shard of at most `lines_per_shard` vertex records owns the id range
//! `[shard * lines_per_shard, (shard + 1) * lines_per_shard)`, and records take
//! consecutive ids from the start of that range in input order. Ids are
//! therefore unique across shards without any coordination. They are dense
//! over `[0, total)` only when every shard but the last is full; uniqueness is
//! guaranteed, packing is not.

use crate::counters::{self, Counters};
use crate::error::{ConfigError, Result};
use crate::substrate::Substrate;
use grafter_model::{DictionaryEntry, RecordClassifier, VertexData, VertexId, VertexLine};

/// Output of one shard (or of all shards, concatenated).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignedIds {
    /// `(surrogateId, rawId)` entries.
    pub dictionary: Vec<DictionaryEntry>,
    /// Renamed vertex lines, `surrogateId \t vertexData`.
    pub vertices: Vec<String>,
}

impl AssignedIds {
    pub fn len(&self) -> usize {
        self.dictionary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dictionary.is_empty()
    }

    fn extend(&mut self, other: AssignedIds) {
        self.dictionary.extend(other.dictionary);
        self.vertices.extend(other.vertices);
    }
}

pub struct DenseIdAssigner<'a, C: RecordClassifier + ?Sized> {
    lines_per_shard: u64,
    classifier: &'a C,
}

impl<'a, C: RecordClassifier + Sync + ?Sized> DenseIdAssigner<'a, C> {
    pub fn new(lines_per_shard: u64, classifier: &'a C) -> Result<Self> {
        if lines_per_shard == 0 {
            return Err(ConfigError::ZeroLinesPerShard.into());
        }
        Ok(Self {
            lines_per_shard,
            classifier,
        })
    }

    pub fn lines_per_shard(&self) -> u64 {
        self.lines_per_shard
    }

    /// Assign ids to one shard.
    ///
    /// Lines that are not vertex records are passed over; vertex records that
    /// fail to parse are logged and skipped without consuming an id.
    pub fn assign_shard<S: AsRef<str>>(
        &self,
        shard: u64,
        lines: &[S],
        counters: &Counters,
    ) -> Result<AssignedIds> {
        let base = shard
            .checked_mul(self.lines_per_shard)
            .ok_or(ConfigError::IdSpaceExhausted { shard })?;
        let mut out = AssignedIds::default();
        let mut sequence = 0u64;

        for line in lines {
            let line = line.as_ref();
            if line.is_empty() || !self.classifier.is_vertex_record(line) {
                continue;
            }
            let fields = match parse_vertex_record(line) {
                Ok(fields) => fields,
                Err(err) => {
                    tracing::warn!(shard, error = %err, record = line, "skipping unparseable vertex record");
                    counters.incr(counters::ID_PARSE_ERRORS, 1);
                    continue;
                }
            };
            if sequence >= self.lines_per_shard {
                return Err(ConfigError::ShardTooLarge {
                    shard,
                    limit: self.lines_per_shard,
                }
                .into());
            }
            let surrogate = base
                .checked_add(sequence)
                .ok_or(ConfigError::IdSpaceExhausted { shard })?;
            sequence += 1;

            out.dictionary
                .push(DictionaryEntry::new(surrogate, fields.key));
            out.vertices.push(format!("{surrogate}\t{}", fields.data));
        }

        counters.incr(counters::IDS_ASSIGNED, sequence);
        Ok(out)
    }

    /// Split `lines` into shards of `lines_per_shard` lines and assign every
    /// shard on the substrate.
    pub fn run<Sub: Substrate>(
        &self,
        substrate: &Sub,
        lines: &[String],
        counters: &Counters,
    ) -> Result<AssignedIds> {
        let shards: Vec<&[String]> = lines.chunks(self.lines_per_shard as usize).collect();
        let shard_count = shards.len();
        let assigned = substrate.run_map("hash_id", shards, |index, shard| {
            self.assign_shard(index as u64, shard, counters)
        })?;

        let mut out = AssignedIds::default();
        for shard in assigned {
            out.extend(shard);
        }
        tracing::info!(
            shards = shard_count,
            ids = out.len(),
            parse_errors = counters.get(counters::ID_PARSE_ERRORS),
            "assigned surrogate ids"
        );
        Ok(out)
    }
}

fn parse_vertex_record(line: &str) -> Result<VertexLine<'_>, grafter_model::ParseError> {
    let fields = VertexLine::split(line)?;
    VertexId::parse_raw(fields.key)?;
    VertexData::from_json(fields.data)?;
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::substrate::LocalSubstrate;
    use grafter_model::ListRecordClassifier;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn vertex_line(name: &str) -> String {
        format!("{name}\t{{\"props\":{{}}}}")
    }

    #[test]
    fn ids_follow_shard_base_and_sequence() {
        let assigner = DenseIdAssigner::new(10, &ListRecordClassifier).unwrap();
        let lines: Vec<String> = ["a", "b", "c"].iter().map(|n| vertex_line(n)).collect();
        let out = assigner.assign_shard(3, &lines, &Counters::new()).unwrap();
        let ids: Vec<u64> = out.dictionary.iter().map(|e| e.surrogate).collect();
        assert_eq!(ids, vec![30, 31, 32]);
        assert_eq!(out.dictionary[1].raw_id, "b");
        assert_eq!(out.vertices[2], "32\t{\"props\":{}}");
    }

    #[test]
    fn bad_records_consume_no_id() {
        let assigner = DenseIdAssigner::new(10, &ListRecordClassifier).unwrap();
        let lines = vec![
            vertex_line("a"),
            "b\tnot-json".to_string(),
            String::new(),
            "x\ty\t{}".to_string(),
            vertex_line("c"),
        ];
        let counters = Counters::new();
        let out = assigner.assign_shard(0, &lines, &counters).unwrap();
        let ids: Vec<u64> = out.dictionary.iter().map(|e| e.surrogate).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(counters.get(counters::ID_PARSE_ERRORS), 1);
    }

    #[test]
    fn oversized_shard_is_fatal() {
        let assigner = DenseIdAssigner::new(2, &ListRecordClassifier).unwrap();
        let lines: Vec<String> = ["a", "b", "c"].iter().map(|n| vertex_line(n)).collect();
        assert!(assigner.assign_shard(0, &lines, &Counters::new()).is_err());
    }

    #[test]
    fn full_shards_are_dense() {
        let substrate = LocalSubstrate::new(2, 2).unwrap();
        let assigner = DenseIdAssigner::new(4, &ListRecordClassifier).unwrap();
        let lines: Vec<String> = (0..10).map(|i| vertex_line(&format!("v{i}"))).collect();
        let out = assigner.run(&substrate, &lines, &Counters::new()).unwrap();
        let mut ids: Vec<u64> = out.dictionary.iter().map(|e| e.surrogate).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..10).collect::<Vec<_>>());
    }

    proptest! {
        #[test]
        fn surrogate_ids_are_unique(names in proptest::collection::hash_set("[a-z]{1,8}", 1..200), per_shard in 1u64..16) {
            let substrate = LocalSubstrate::new(3, 2).unwrap();
            let assigner = DenseIdAssigner::new(per_shard, &ListRecordClassifier).unwrap();
            let lines: Vec<String> = names.iter().map(|n| vertex_line(n)).collect();
            let out = assigner.run(&substrate, &lines, &Counters::new()).unwrap();
            prop_assert_eq!(out.len(), names.len());
            let ids: HashSet<u64> = out.dictionary.iter().map(|e| e.surrogate).collect();
            prop_assert_eq!(ids.len(), names.len());
        }
    }
}

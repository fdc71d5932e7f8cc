//! Stage orchestration.
//!
//! ```text
//!   records ──tokenize──► merge ──┬─► hash_id ─► sort_dict ─► sort_edge ─► trans_edge
//!                                 └─► sink_vertices ─► sink_edges
//! ```
//!
//! A [`Pipeline`] owns the configuration, the substrate and the counters of
//! one run. Each stage is callable on its own; the two `build_*`/`load_*`
//! methods chain them.

use crate::combine::ReducerRegistry;
use crate::config::PipelineConfig;
use crate::counters::{self, Counters};
use crate::dense_id::{AssignedIds, DenseIdAssigner};
use crate::dictionary::{DictionaryShardBuilder, ShardKey, ShardManifest};
use crate::error::Result;
use crate::io;
use crate::join::{EdgeRepartitionJoin, JoinState, ShardFileLookup};
use crate::merge::{merge_key, GraphElementMerger, MergeReducer};
use crate::partition::PartitionHasher;
use crate::sink::{ExternalSinkIdPropagator, SinkOutcome};
use crate::substrate::{LocalSubstrate, Reducer, Substrate};
use grafter_model::codec::{encode_edge, encode_vertex};
use grafter_model::{
    DictionaryEntry, GraphElement, ListRecordClassifier, StoreConnector, Tokenizer,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Sub-directories of a surrogate run's output directory.
pub const DICTIONARY_DIR: &str = "dictionary";
pub const REVERSE_DICTIONARY_DIR: &str = "dictionary-by-surrogate";
pub const VERTICES_DIR: &str = "vertices";
pub const EDGES_DIR: &str = "edges";
pub const PART_PREFIX: &str = "part";

/// Summary of [`Pipeline::build_surrogate_graph`].
#[derive(Debug, Clone, Serialize)]
pub struct SurrogateRunReport {
    pub output: PathBuf,
    pub vertices: u64,
    pub edges: u64,
    pub dictionary: ShardManifest,
    pub counters: BTreeMap<String, u64>,
}

/// Summary of [`Pipeline::load_into_store`].
#[derive(Debug, Clone, Serialize)]
pub struct SinkRunReport {
    pub vertices: u64,
    pub edges: u64,
    pub commits: u64,
    pub counters: BTreeMap<String, u64>,
}

/// Merged elements encoded as list lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphLists {
    pub vertices: Vec<String>,
    pub edges: Vec<String>,
    /// Elements whose payload has no JSON form; logged and left out.
    pub rejected: u64,
}

impl GraphLists {
    pub fn from_elements(elements: &[GraphElement]) -> Self {
        let mut lists = Self::default();
        for element in elements {
            let encoded = match element {
                GraphElement::Vertex(v) => encode_vertex(v)
                    .map(|line| lists.vertices.push(line))
                    .map_err(|err| (v.id.to_string(), err)),
                GraphElement::Edge(e) => encode_edge(e)
                    .map(|line| lists.edges.push(line))
                    .map_err(|err| (e.id.to_string(), err)),
            };
            if let Err((id, err)) = encoded {
                tracing::warn!(element = %id, error = %err, "dropping element with unencodable payload");
                lists.rejected += 1;
            }
        }
        lists
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    substrate: LocalSubstrate,
    merger: GraphElementMerger,
    counters: Counters,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Self::with_registry(config, &ReducerRegistry::builtin())
    }

    /// Build a pipeline whose combine functions are looked up in `registry`.
    pub fn with_registry(config: PipelineConfig, registry: &ReducerRegistry) -> Result<Self> {
        config.validate(registry)?;
        let substrate = LocalSubstrate::new(config.partitions, config.workers)?;
        let merger = GraphElementMerger::from_config(&config, registry)?;
        Ok(Self {
            config,
            substrate,
            merger,
            counters: Counters::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn substrate(&self) -> &LocalSubstrate {
        &self.substrate
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn hasher(&self) -> PartitionHasher {
        self.substrate.hasher()
    }

    // ------------------------------------------------------------------------
    // Stages
    // ------------------------------------------------------------------------

    /// Tokenize raw records and deduplicate the resulting elements.
    pub fn merge_records(&self, tokenizer: &dyn Tokenizer, records: Vec<String>) -> Result<Vec<GraphElement>> {
        let counters = &self.counters;
        let out = self.substrate.run_pass(
            "merge",
            records,
            |record, emit| {
                counters.incr(counters::RECORDS_READ, 1);
                match tokenizer.tokenize(&record) {
                    Ok(tokens) => {
                        for element in tokens.into_elements() {
                            emit.emit(merge_key(&element), element);
                        }
                    }
                    Err(err) => {
                        tracing::warn!(tokenizer = tokenizer.name(), error = %err, record = %record, "skipping unparseable record");
                        counters.incr(counters::RECORDS_UNPARSEABLE, 1);
                    }
                }
                Ok(())
            },
            |_partition| Ok(MergeReducer::new(&self.merger, counters)),
        )?;
        let elements: Vec<GraphElement> = out.into_iter().flatten().collect();
        tracing::info!(
            records = counters.get(counters::RECORDS_READ),
            unparseable = counters.get(counters::RECORDS_UNPARSEABLE),
            vertices = counters.get(counters::VERTICES_EMITTED),
            edges = counters.get(counters::EDGES_EMITTED),
            self_loops = counters.get(counters::SELF_LOOPS_DROPPED),
            reverse_edges = counters.get(counters::REVERSE_EDGES_DROPPED),
            "merged graph elements"
        );
        Ok(elements)
    }

    /// Deduplicate elements that are already tokenized.
    pub fn merge_elements(&self, elements: Vec<GraphElement>) -> Result<Vec<GraphElement>> {
        let out = self.substrate.run_pass(
            "merge",
            elements,
            |element, emit| {
                emit.emit(merge_key(&element), element);
                Ok(())
            },
            |_partition| Ok(MergeReducer::new(&self.merger, &self.counters)),
        )?;
        Ok(out.into_iter().flatten().collect())
    }

    pub fn assign_ids(&self, vertex_lines: &[String]) -> Result<AssignedIds> {
        DenseIdAssigner::new(self.config.lines_per_shard, &ListRecordClassifier)?.run(
            &self.substrate,
            vertex_lines,
            &self.counters,
        )
    }

    pub fn build_dictionary(&self, entries: Vec<DictionaryEntry>, dir: &Path, key: ShardKey) -> Result<ShardManifest> {
        DictionaryShardBuilder::new(key).build(&self.substrate, entries, dir, &self.counters)
    }

    /// Rewrite both endpoints of `edges` through the dictionary in `dictionary`.
    pub fn join_edges(&self, dictionary: &Path, edges: Vec<String>) -> Result<Vec<String>> {
        EdgeRepartitionJoin::new(dictionary, &self.counters).run(&self.substrate, edges)
    }

    /// Translate surrogate ids back to raw ids through a dictionary sharded
    /// by surrogate id. Unknown ids are counted as misses and left out.
    pub fn lookup_raw_ids(&self, dictionary: &Path, ids: Vec<u64>) -> Result<Vec<DictionaryEntry>> {
        ShardManifest::read(dictionary)?.check(dictionary, ShardKey::SurrogateId, self.substrate.partitions())?;
        let counters = &self.counters;
        let hasher = self.hasher();
        let out = self.substrate.run_pass(
            "lookup_raw_ids",
            ids,
            |id, emit| {
                emit.emit(id.to_string(), id);
                Ok(())
            },
            |_partition| {
                Ok(RawIdResolver {
                    hasher,
                    dictionary,
                    state: JoinState::new(ShardFileLookup::raw_ids(counters), counters),
                })
            },
        )?;
        let mut entries: Vec<DictionaryEntry> = out.into_iter().flatten().collect();
        entries.sort_by_key(|e| e.surrogate);
        Ok(entries)
    }

    // ------------------------------------------------------------------------
    // End-to-end runs
    // ------------------------------------------------------------------------

    /// Records to a surrogate-id graph under `output`:
    /// `vertices/`, `edges/`, and both dictionary directions.
    pub fn build_surrogate_graph(
        &self,
        tokenizer: &dyn Tokenizer,
        records: Vec<String>,
        output: &Path,
    ) -> Result<SurrogateRunReport> {
        let dictionary_dir = output.join(DICTIONARY_DIR);
        let vertices_dir = output.join(VERTICES_DIR);
        let edges_dir = output.join(EDGES_DIR);
        for dir in [&dictionary_dir, &vertices_dir, &edges_dir] {
            io::prepare_output_dir(dir)?;
        }

        let elements = self.merge_records(tokenizer, records)?;
        let lists = GraphLists::from_elements(&elements);
        self.counters.incr(counters::PAYLOADS_REJECTED, lists.rejected);
        drop(elements);

        let assigned = self.assign_ids(&lists.vertices)?;
        let dictionary = self.build_dictionary(assigned.dictionary.clone(), &dictionary_dir, ShardKey::RawId)?;
        self.build_dictionary(
            assigned.dictionary,
            &output.join(REVERSE_DICTIONARY_DIR),
            ShardKey::SurrogateId,
        )?;
        let vertices = io::write_partitioned(&vertices_dir, PART_PREFIX, &[assigned.vertices])?;

        let edges = self.join_edges(&dictionary_dir, lists.edges)?;
        let edges = io::write_partitioned(&edges_dir, PART_PREFIX, &[edges])?;

        tracing::info!(output = %output.display(), vertices, edges, "surrogate graph written");
        Ok(SurrogateRunReport {
            output: output.to_path_buf(),
            vertices,
            edges,
            dictionary,
            counters: self.counters.snapshot(),
        })
    }

    /// Records into an external store through `connector`.
    pub fn load_into_store<C: StoreConnector>(
        &self,
        tokenizer: &dyn Tokenizer,
        records: Vec<String>,
        connector: &C,
    ) -> Result<SinkRunReport> {
        let elements = self.merge_records(tokenizer, records)?;
        let SinkOutcome { vertices, edges } =
            ExternalSinkIdPropagator::from_config(connector, &self.merger, &self.config, &self.counters)
                .run(&self.substrate, elements)?;
        Ok(SinkRunReport {
            vertices,
            edges,
            commits: self.counters.get(counters::STORE_COMMITS),
            counters: self.counters.snapshot(),
        })
    }
}

struct RawIdResolver<'a> {
    hasher: PartitionHasher,
    dictionary: &'a Path,
    state: JoinState<'a, ShardFileLookup<'a, String>>,
}

impl Reducer for RawIdResolver<'_> {
    type Key = String;
    type Value = u64;
    type Output = DictionaryEntry;

    fn reduce(&mut self, key: String, ids: Vec<u64>, out: &mut Vec<DictionaryEntry>) -> Result<()> {
        self.state.ensure_loaded(&self.hasher.bucket(key.as_str()), self.dictionary)?;
        if let Some(raw_id) = self.state.resolve(key.as_str(), &key, 1) {
            // Repeated ids collapse into one entry.
            if let Some(&surrogate) = ids.first() {
                out.push(DictionaryEntry::new(surrogate, raw_id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use grafter_model::{Edge, EdgeId, ParseError, Tokens, Vertex, VertexId};

    /// `v name` or `e src dst label`.
    struct WordTokenizer;

    impl Tokenizer for WordTokenizer {
        fn name(&self) -> &'static str {
            "words"
        }

        fn tokenize(&self, record: &str) -> std::result::Result<Tokens, ParseError> {
            let words: Vec<&str> = record.split_whitespace().collect();
            let mut tokens = Tokens::default();
            match words.as_slice() {
                ["v", name] => tokens.vertices.push(Vertex::new(VertexId::new(*name))),
                ["e", src, dst, label] => tokens.edges.push(Edge::new(EdgeId::new(
                    VertexId::new(*src),
                    VertexId::new(*dst),
                    *label,
                ))),
                _ => return Err(ParseError::Record(record.to_string())),
            }
            Ok(tokens)
        }
    }

    fn records(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|l| l.to_string()).collect()
    }

    fn pipeline(partitions: usize) -> Pipeline {
        Pipeline::new(PipelineConfig::default().with_partitions(partitions)).unwrap()
    }

    #[test]
    fn merge_counts_unparseable_records() {
        let p = pipeline(3);
        let merged = p
            .merge_records(&WordTokenizer, records(&["v a", "v a", "garbage", "e a a x"]))
            .unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(p.counters().get(counters::RECORDS_UNPARSEABLE), 1);
        assert_eq!(p.counters().get(counters::SELF_LOOPS_DROPPED), 1);
    }

    #[test]
    fn surrogate_run_writes_every_output() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(4);
        let report = p
            .build_surrogate_graph(
                &WordTokenizer,
                records(&["v a", "v b", "v c", "e a b x", "e b c x", "e c z x"]),
                dir.path(),
            )
            .unwrap();
        assert_eq!(report.vertices, 3);
        assert_eq!(report.edges, 2);
        assert_eq!(report.dictionary.entries, 3);
        assert_eq!(report.counters[counters::RESOLUTION_MISSES], 1);
        assert!(dir.path().join(REVERSE_DICTIONARY_DIR).join("_SHARDS").exists());
        let edges = io::read_input(&dir.path().join(EDGES_DIR)).unwrap();
        assert_eq!(edges.len(), 2);
    }

    #[test]
    fn raw_ids_come_back_from_the_reverse_dictionary() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(2);
        p.build_surrogate_graph(&WordTokenizer, records(&["v a", "v b"]), dir.path())
            .unwrap();
        let entries = p
            .lookup_raw_ids(&dir.path().join(REVERSE_DICTIONARY_DIR), vec![1, 0, 0, 77])
            .unwrap();
        let mut raw: Vec<&str> = entries.iter().map(|e| e.raw_id.as_str()).collect();
        raw.sort_unstable();
        assert_eq!(raw, vec!["a", "b"]);
        assert_eq!(p.counters().get(counters::RESOLUTION_MISSES), 1);
    }

    #[test]
    fn forward_dictionary_is_not_a_reverse_one() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(2);
        p.build_surrogate_graph(&WordTokenizer, records(&["v a"]), dir.path())
            .unwrap();
        assert!(p.lookup_raw_ids(&dir.path().join(DICTIONARY_DIR), vec![0]).is_err());
    }

    #[test]
    fn rerunning_into_the_same_output_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(2);
        p.build_surrogate_graph(&WordTokenizer, records(&["v a"]), dir.path())
            .unwrap();
        let again = pipeline(2).build_surrogate_graph(&WordTokenizer, records(&["v a"]), dir.path());
        assert!(matches!(again, Err(PipelineError::Config(_))));
    }
}

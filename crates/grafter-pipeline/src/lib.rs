//! Grafter pipeline: distributed id resolution and graph deduplication
//!
//! Turns tokenized records into a deduplicated property graph and then either
//! renames every vertex to a dense surrogate id or loads the graph into a
//! store that assigns its own ids. No worker ever holds the full raw-id
//! dictionary:
//!
//! 1. **Partitioning**: [`PartitionHasher`] maps a key to a bucket the same
//!    way in every process
//! 2. **Dense ids**: [`DenseIdAssigner`] gives each input shard a disjoint id
//!    range
//! 3. **Dictionary shards**: [`DictionaryShardBuilder`] writes one
//!    `surrogateId \t rawId` file per bucket
//! 4. **Repartition join**: [`EdgeRepartitionJoin`] resolves edge endpoints
//!    one bucket at a time
//! 5. **Merging**: [`GraphElementMerger`] folds duplicates and prunes
//!    self-loops and reverse edges
//! 6. **External sinks**: [`ExternalSinkIdPropagator`] propagates
//!    store-assigned ids from vertices to their edges
//!
//! Stages run on a [`Substrate`]; [`LocalSubstrate`] is an in-process one.
//! [`Pipeline`] wires the stages together.

pub mod combine;
pub mod config;
pub mod counters;
pub mod dense_id;
pub mod dictionary;
pub mod error;
pub mod io;
pub mod join;
pub mod merge;
pub mod partition;
pub mod pipeline;
pub mod sink;
pub mod substrate;

pub use combine::{PropertyReducer, ReducerRegistry, DEFAULT_REDUCER};
pub use config::PipelineConfig;
pub use counters::Counters;
pub use dense_id::{AssignedIds, DenseIdAssigner};
pub use dictionary::{DictionaryShardBuilder, ShardKey, ShardManifest};
pub use error::{ConfigError, ExitStatus, PipelineError, Result};
pub use join::{
    EdgeRepartitionJoin, Endpoint, GroupScanLookup, JoinPhase, JoinState, LookupProvider,
    ShardFileLookup,
};
pub use merge::{merge_key, GraphElementMerger, MergeStats, Merged};
pub use partition::{PartitionHasher, StableHash};
pub use pipeline::{GraphLists, Pipeline, SinkRunReport, SurrogateRunReport};
pub use sink::{ExternalSinkIdPropagator, SinkOutcome, SinkRecord, StoreSession};
pub use substrate::{Emitter, LocalSubstrate, Partitioned, Reducer, Substrate};

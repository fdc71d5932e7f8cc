//! Map → shuffle → reduce execution.
//!
//! ```text
//!   inputs ──map──► (key, value) ──bucket(key)──► partition k ──group by key──► Reducer_k
//! ```
//!
//! A [`Substrate`] guarantees that every value emitted under one key reaches
//! the same [`Reducer`] invocation, and that all keys of one partition are
//! handled by one reducer instance, constructed for that partition and never
//! shared. Value order inside a group is not part of the contract.
//!
//! [`LocalSubstrate`] runs both phases on a bounded rayon pool inside this
//! process. The return of [`Substrate::run_pass`] is the barrier between
//! passes: nothing of pass 2 starts before every partition of pass 1 is done.

use crate::error::{ConfigError, PipelineError, Result};
use crate::partition::{PartitionHasher, StableHash};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::time::Instant;

// ============================================================================
// Map side
// ============================================================================

/// Collects `(key, value)` pairs emitted by one map call.
#[derive(Debug)]
pub struct Emitter<K, V> {
    pairs: Vec<(K, V)>,
}

impl<K, V> Emitter<K, V> {
    fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    pub fn emit(&mut self, key: K, value: V) {
        self.pairs.push((key, value));
    }
}

// ============================================================================
// Reduce side
// ============================================================================

/// Per-partition worker context.
///
/// One instance is built for each non-empty partition and sees that
/// partition's groups one at a time, in key order.
pub trait Reducer: Send {
    type Key;
    type Value;
    type Output: Send;

    fn reduce(
        &mut self,
        key: Self::Key,
        values: Vec<Self::Value>,
        out: &mut Vec<Self::Output>,
    ) -> Result<()>;

    /// Called once after the last group of the partition.
    fn finish(&mut self, _out: &mut Vec<Self::Output>) -> Result<()> {
        Ok(())
    }
}

/// Output of one pass, indexed by partition.
pub type Partitioned<T> = Vec<Vec<T>>;

/// The map/shuffle/reduce primitive every two-pass stage is written against.
pub trait Substrate {
    fn hasher(&self) -> PartitionHasher;

    fn partitions(&self) -> usize {
        self.hasher().buckets()
    }

    /// Run one full pass. `reducer` builds the context for partition `k`.
    fn run_pass<I, K, V, R, M, F>(
        &self,
        name: &str,
        inputs: Vec<I>,
        map: M,
        reducer: F,
    ) -> Result<Partitioned<R::Output>>
    where
        I: Send,
        K: StableHash + Ord + Send,
        V: Send,
        R: Reducer<Key = K, Value = V>,
        M: Fn(I, &mut Emitter<K, V>) -> Result<()> + Sync,
        F: Fn(usize) -> Result<R> + Sync;

    /// Map-only pass; outputs keep input order.
    fn run_map<I, O, M>(&self, name: &str, inputs: Vec<I>, map: M) -> Result<Vec<O>>
    where
        I: Send,
        O: Send,
        M: Fn(usize, I) -> Result<O> + Sync;
}

// ============================================================================
// Local substrate
// ============================================================================

/// In-process substrate backed by a dedicated rayon pool.
pub struct LocalSubstrate {
    hasher: PartitionHasher,
    pool: rayon::ThreadPool,
}

impl LocalSubstrate {
    pub fn new(partitions: usize, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(ConfigError::ZeroWorkers.into());
        }
        let hasher = PartitionHasher::new(partitions)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("grafter-worker-{i}"))
            .build()
            .map_err(|e| ConfigError::WorkerPool(e.to_string()))?;
        Ok(Self { hasher, pool })
    }
}

impl Substrate for LocalSubstrate {
    fn hasher(&self) -> PartitionHasher {
        self.hasher
    }

    fn run_pass<I, K, V, R, M, F>(
        &self,
        name: &str,
        inputs: Vec<I>,
        map: M,
        reducer: F,
    ) -> Result<Partitioned<R::Output>>
    where
        I: Send,
        K: StableHash + Ord + Send,
        V: Send,
        R: Reducer<Key = K, Value = V>,
        M: Fn(I, &mut Emitter<K, V>) -> Result<()> + Sync,
        F: Fn(usize) -> Result<R> + Sync,
    {
        let started = Instant::now();
        let input_count = inputs.len();

        let emitted: Vec<Vec<(K, V)>> = self.pool.install(|| {
            inputs
                .into_par_iter()
                .map(|input| {
                    let mut emitter = Emitter::new();
                    map(input, &mut emitter)?;
                    Ok(emitter.pairs)
                })
                .collect::<Result<_>>()
        })?;

        let mut partitions: Vec<BTreeMap<K, Vec<V>>> =
            (0..self.partitions()).map(|_| BTreeMap::new()).collect();
        let mut pairs = 0usize;
        for (key, value) in emitted.into_iter().flatten() {
            pairs += 1;
            let bucket = self.hasher.bucket(&key);
            partitions[bucket].entry(key).or_default().push(value);
        }

        let outputs = self.pool.install(|| {
            partitions
                .into_par_iter()
                .enumerate()
                .map(|(index, groups)| {
                    if groups.is_empty() {
                        return Ok(Vec::new());
                    }
                    let mut worker = reducer(index)?;
                    let mut out = Vec::new();
                    for (key, values) in groups {
                        worker.reduce(key, values, &mut out)?;
                    }
                    worker.finish(&mut out)?;
                    Ok(out)
                })
                .collect::<Result<Vec<_>, PipelineError>>()
        })?;

        tracing::debug!(
            pass = name,
            inputs = input_count,
            pairs,
            partitions = self.partitions(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pass complete"
        );
        Ok(outputs)
    }

    fn run_map<I, O, M>(&self, name: &str, inputs: Vec<I>, map: M) -> Result<Vec<O>>
    where
        I: Send,
        O: Send,
        M: Fn(usize, I) -> Result<O> + Sync,
    {
        let input_count = inputs.len();
        let out = self.pool.install(|| {
            inputs
                .into_par_iter()
                .enumerate()
                .map(|(index, input)| map(index, input))
                .collect::<Result<Vec<_>>>()
        })?;
        tracing::debug!(pass = name, inputs = input_count, "map-only pass complete");
        Ok(out)
    }
}

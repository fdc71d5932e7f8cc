//! Two-pass repartition join.
//!
//! Both id-resolution pipelines resolve foreign keys the same way: records
//! arrive grouped by a partition key, the worker keeps one lookup table
//! resident, and swaps it only when the group at hand belongs to a different
//! table.
//!
//! ```text
//!   IDLE ──load(k)──► LOADED(k) ──resolve──► LOADED(k) ──load(k')──► LOADED(k') ...
//! ```
//!
//! Reloading on a token mismatch is always correct, only slower, so input
//! that is not perfectly grouped costs extra loads, never wrong answers.
//! Where the table comes from is the [`LookupProvider`]'s business: a
//! dictionary shard file ([`ShardFileLookup`]) or the vertex records sharing
//! the current group ([`GroupScanLookup`]).

mod edges;
mod group_scan;
mod shard_lookup;

pub use edges::{EdgeRepartitionJoin, Endpoint};
pub use group_scan::GroupScanLookup;
pub use shard_lookup::ShardFileLookup;

use crate::counters::{self, Counters};
use crate::error::Result;
use std::fmt::Debug;

/// A source of bucketed lookup tables.
pub trait LookupProvider {
    /// Identifies one loadable table (a bucket, or a group key).
    type Token: Clone + PartialEq + Debug;
    /// Looked-up key.
    type Key: ?Sized + Debug;
    /// Resolved id.
    type Id: Clone + Debug;
    /// Whatever the provider reads a table from.
    type Source<'s>;

    /// Replace the resident table with the one for `token`.
    fn load(&mut self, token: &Self::Token, source: Self::Source<'_>) -> Result<()>;

    fn get(&self, key: &Self::Key) -> Option<Self::Id>;

    /// Entries in the resident table.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which table, if any, a worker currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinPhase<T> {
    Idle,
    Loaded(T),
}

/// Per-worker join state.
pub struct JoinState<'c, P: LookupProvider> {
    provider: P,
    phase: JoinPhase<P::Token>,
    loads: u64,
    counters: &'c Counters,
}

impl<'c, P: LookupProvider> JoinState<'c, P> {
    pub fn new(provider: P, counters: &'c Counters) -> Self {
        Self {
            provider,
            phase: JoinPhase::Idle,
            loads: 0,
            counters,
        }
    }

    pub fn phase(&self) -> &JoinPhase<P::Token> {
        &self.phase
    }

    /// Tables loaded so far by this worker.
    pub fn loads(&self) -> u64 {
        self.loads
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Make `token`'s table resident, loading it from `source` unless it
    /// already is. Returns whether a load happened.
    pub fn ensure_loaded(&mut self, token: &P::Token, source: P::Source<'_>) -> Result<bool> {
        if matches!(&self.phase, JoinPhase::Loaded(current) if current == token) {
            return Ok(false);
        }
        // Drop the old table before reading the next so only one is resident.
        self.phase = JoinPhase::Idle;
        self.provider.load(token, source)?;
        self.phase = JoinPhase::Loaded(token.clone());
        self.loads += 1;
        self.counters.incr(counters::SHARD_LOADS, 1);
        tracing::debug!(token = ?token, entries = self.provider.len(), "loaded lookup table");
        Ok(true)
    }

    /// Resolve `key` against the resident table.
    ///
    /// A miss means the key was never assigned an id. It is logged with the
    /// record that referenced it and counted; `records` is how many records
    /// are dropped with it.
    pub fn resolve(&self, key: &P::Key, record: &str, records: u64) -> Option<P::Id> {
        if let JoinPhase::Loaded(_) = self.phase {
            if let Some(id) = self.provider.get(key) {
                self.counters.incr(counters::RESOLVED, records);
                return Some(id);
            }
        }
        tracing::error!(
            key = ?key,
            record,
            dropped = records,
            "unresolved reference; dropping record"
        );
        self.counters.incr(counters::RESOLUTION_MISSES, records);
        None
    }
}

//! External graph-store seam.
//!
//! The store assigns its own vertex ids; the sink pipeline only learns them as
//! the return value of [`GraphStore::insert_vertex`].

use crate::PropValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Property key under which the sink records a vertex's raw id.
pub const RAW_ID_KEY: &str = "_raw_id";
/// Property key under which the sink records a vertex's label.
pub const LABEL_KEY: &str = "_label";

/// Vertex property keys owned by the sink. User properties with these names
/// are not written to the store.
pub const RESERVED_KEYS: [&str; 2] = [RAW_ID_KEY, LABEL_KEY];

pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Store-assigned vertex id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct StoreId(u64);

impl StoreId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned edge handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct EdgeHandle(u64);

impl EdgeHandle {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Target of a property write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementHandle {
    Vertex(StoreId),
    Edge(EdgeHandle),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("schema violation on label '{label}': {reason}")]
    SchemaViolation { label: String, reason: String },

    #[error("unknown vertex {0}")]
    UnknownVertex(StoreId),

    #[error("unknown edge handle {0:?}")]
    UnknownEdge(EdgeHandle),

    #[error("commit failed: {0}")]
    Commit(String),

    #[error("session already closed")]
    Closed,
}

/// One open session against the external store.
///
/// Writes become durable at [`GraphStore::commit`]; ids are valid as soon as
/// the insert call returns.
pub trait GraphStore {
    fn insert_vertex(&mut self) -> Result<StoreId, StoreError>;

    fn insert_edge(
        &mut self,
        src: StoreId,
        dst: StoreId,
        label: &str,
    ) -> Result<EdgeHandle, StoreError>;

    fn set_property(
        &mut self,
        handle: ElementHandle,
        key: &str,
        value: &PropValue,
    ) -> Result<(), StoreError>;

    fn commit(&mut self) -> Result<(), StoreError>;

    /// Release the session. Uncommitted writes are discarded.
    fn close(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Opens store sessions; one session per worker per pass.
pub trait StoreConnector: Sync {
    type Store: GraphStore + Send;

    fn connect(&self) -> Result<Self::Store, StoreError>;
}

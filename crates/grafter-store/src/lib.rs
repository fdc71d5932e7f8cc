//! In-memory property-graph store
//!
//! A [`MemoryGraph`] is the reference target for the sink stage:
//! - sessions buffer writes and apply them atomically at commit
//! - vertex and edge ids are compact `u32`s handed out at insert time
//! - labels, raw ids and adjacency are indexed with roaring bitmaps
//! - an optional [`StoreSchema`] restricts vertex and edge labels
//! - committed state snapshots to a versioned binary file
//!
//! ```
//! use grafter_model::GraphStore;
//! use grafter_store::MemoryGraph;
//!
//! let graph = MemoryGraph::new();
//! let mut session = graph.session();
//! let a = session.insert_vertex().unwrap();
//! let b = session.insert_vertex().unwrap();
//! session.insert_edge(a, b, "knows").unwrap();
//! session.commit().unwrap();
//! assert_eq!(graph.out_edges(a).len(), 1);
//! ```

mod graph;
mod interner;
mod schema;
mod session;

pub use graph::{EdgeView, VertexView};
pub use interner::{StringInterner, Sym};
pub use schema::StoreSchema;
pub use session::{MemoryConnector, MemoryGraph, MemorySession};

use std::path::PathBuf;

/// Errors reading or writing snapshot and schema files.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot encoding failed: {0}")]
    Encode(#[source] bincode::Error),

    #[error("snapshot decoding failed: {0}")]
    Decode(#[source] bincode::Error),

    #[error("bad snapshot: {0}")]
    Format(String),

    #[error("bad schema file {}: {reason}", path.display())]
    Schema { path: PathBuf, reason: String },
}

//! Shared in-memory graph and its transactional sessions.

use crate::graph::{EdgeView, GraphData, IndexedKeys, Op, StoredValue, VertexView};
use crate::interner::{StringInterner, Sym};
use crate::schema::StoreSchema;
use crate::PersistError;
use grafter_model::{
    EdgeHandle, ElementHandle, GraphStore, PropValue, StoreConnector, StoreError, StoreId,
    LABEL_KEY, RAW_ID_KEY,
};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const SNAPSHOT_MAGIC: &[u8; 4] = b"GRFS";
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug)]
struct Shared {
    data: RwLock<GraphData>,
    interner: StringInterner,
    next_vertex: AtomicU32,
    next_edge: AtomicU32,
    schema: StoreSchema,
    keys: IndexedKeys,
}

impl Shared {
    fn new(data: GraphData, interner: StringInterner, schema: StoreSchema) -> Self {
        let keys = IndexedKeys {
            label: interner.intern(LABEL_KEY),
            raw_id: interner.intern(RAW_ID_KEY),
        };
        let (vertices, edges) = data.high_water();
        Self {
            data: RwLock::new(data),
            interner,
            next_vertex: AtomicU32::new(vertices),
            next_edge: AtomicU32::new(edges),
            schema,
            keys,
        }
    }
}

fn allocate(counter: &AtomicU32, what: &str) -> Result<u32, StoreError> {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
        .map_err(|_| StoreError::Commit(format!("{what} id space exhausted")))
}

/// An in-memory property graph that many sessions write concurrently.
///
/// Cloning is cheap and every clone sees the same graph. Writes become
/// visible when the session that made them commits.
#[derive(Debug, Clone)]
pub struct MemoryGraph {
    shared: Arc<Shared>,
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::with_schema(StoreSchema::open())
    }

    pub fn with_schema(schema: StoreSchema) -> Self {
        Self {
            shared: Arc::new(Shared::new(GraphData::default(), StringInterner::new(), schema)),
        }
    }

    pub fn schema(&self) -> &StoreSchema {
        &self.shared.schema
    }

    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector { graph: self.clone() }
    }

    pub fn session(&self) -> MemorySession {
        MemorySession::new(Arc::clone(&self.shared))
    }

    // ========================================================================
    // Reads (committed state only)
    // ========================================================================

    pub fn vertex_count(&self) -> u64 {
        self.shared.data.read().vertex_count()
    }

    pub fn edge_count(&self) -> u64 {
        self.shared.data.read().edge_count()
    }

    pub fn vertex(&self, id: StoreId) -> Option<VertexView> {
        let id = u32::try_from(id.raw()).ok()?;
        let shared = &self.shared;
        shared.data.read().vertex_view(id, shared.keys, &shared.interner)
    }

    /// The vertex whose `_raw_id` property equals `raw`.
    pub fn find_by_raw_id(&self, raw: &str) -> Option<VertexView> {
        let shared = &self.shared;
        let data = shared.data.read();
        let id = data.raw_id(raw)?;
        data.vertex_view(id, shared.keys, &shared.interner)
    }

    pub fn vertices(&self) -> Vec<VertexView> {
        let shared = &self.shared;
        let data = shared.data.read();
        data.vertex_ids()
            .filter_map(|id| data.vertex_view(id, shared.keys, &shared.interner))
            .collect()
    }

    pub fn vertices_with_label(&self, label: &str) -> Vec<VertexView> {
        let shared = &self.shared;
        let data = shared.data.read();
        data.vertices_with_label(shared.interner.id_of(label))
            .iter()
            .filter_map(|id| data.vertex_view(id, shared.keys, &shared.interner))
            .collect()
    }

    pub fn edges(&self) -> Vec<EdgeView> {
        let shared = &self.shared;
        let data = shared.data.read();
        data.edge_ids()
            .filter_map(|id| data.edge_view(id, &shared.interner))
            .collect()
    }

    pub fn edges_with_label(&self, label: &str) -> Vec<EdgeView> {
        let shared = &self.shared;
        let data = shared.data.read();
        data.edges_with_label(shared.interner.id_of(label))
            .iter()
            .filter_map(|id| data.edge_view(id, &shared.interner))
            .collect()
    }

    pub fn out_edges(&self, vertex: StoreId) -> Vec<EdgeView> {
        self.adjacent(vertex, GraphData::outgoing)
    }

    pub fn in_edges(&self, vertex: StoreId) -> Vec<EdgeView> {
        self.adjacent(vertex, GraphData::incoming)
    }

    fn adjacent(
        &self,
        vertex: StoreId,
        index: fn(&GraphData, u32) -> roaring::RoaringBitmap,
    ) -> Vec<EdgeView> {
        let Ok(vertex) = u32::try_from(vertex.raw()) else {
            return Vec::new();
        };
        let shared = &self.shared;
        let data = shared.data.read();
        index(&*data, vertex)
            .iter()
            .filter_map(|id| data.edge_view(id, &shared.interner))
            .collect()
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Serialize the committed graph. Pending session writes are not included.
    pub fn to_bytes(&self) -> Result<Vec<u8>, PersistError> {
        let shared = &self.shared;
        let data = shared.data.read();
        let body = bincode::serialize(&(&shared.schema, shared.interner.entries(), &*data))
            .map_err(PersistError::Encode)?;

        let mut bytes = Vec::with_capacity(body.len() + 16);
        bytes.extend_from_slice(SNAPSHOT_MAGIC);
        bytes.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(body.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PersistError> {
        if bytes.len() < 16 || &bytes[0..4] != SNAPSHOT_MAGIC {
            return Err(PersistError::Format("not a grafter snapshot".to_string()));
        }
        let mut word = [0u8; 4];
        word.copy_from_slice(&bytes[4..8]);
        let version = u32::from_le_bytes(word);
        if version != SNAPSHOT_VERSION {
            return Err(PersistError::Format(format!(
                "unsupported snapshot version {version}"
            )));
        }
        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[8..16]);
        let len = u64::from_le_bytes(len) as usize;
        let body = bytes
            .get(16..16usize.saturating_add(len))
            .ok_or_else(|| PersistError::Format("truncated snapshot".to_string()))?;

        let (schema, entries, data): (StoreSchema, Vec<(Sym, String)>, GraphData) =
            bincode::deserialize(body).map_err(PersistError::Decode)?;
        Ok(Self {
            shared: Arc::new(Shared::new(data, StringInterner::from_entries(entries), schema)),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, &bytes).map_err(|source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(
            path = %path.display(),
            vertices = self.vertex_count(),
            edges = self.edge_count(),
            bytes = bytes.len(),
            "saved graph snapshot"
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, PersistError> {
        let bytes = std::fs::read(path).map_err(|source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(&bytes)
    }
}

/// Opens [`MemorySession`]s on one [`MemoryGraph`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    graph: MemoryGraph,
}

impl MemoryConnector {
    pub fn graph(&self) -> &MemoryGraph {
        &self.graph
    }
}

impl StoreConnector for MemoryConnector {
    type Store = MemorySession;

    fn connect(&self) -> Result<MemorySession, StoreError> {
        Ok(self.graph.session())
    }
}

/// One transaction stream against a [`MemoryGraph`].
///
/// Ids are allocated at insert time. Writes are buffered and applied
/// atomically at [`GraphStore::commit`]; a failed commit discards the batch.
#[derive(Debug)]
pub struct MemorySession {
    shared: Arc<Shared>,
    pending: Vec<Op>,
    /// Uncommitted vertices and the label each was given so far.
    new_vertices: HashMap<u32, Option<String>>,
    new_edges: HashSet<u32>,
    commits: u64,
    closed: bool,
}

impl MemorySession {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            pending: Vec::new(),
            new_vertices: HashMap::new(),
            new_edges: HashSet::new(),
            commits: 0,
            closed: false,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn commits(&self) -> u64 {
        self.commits
    }

    fn live(&self) -> Result<(), StoreError> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn vertex_slot(&self, id: StoreId) -> Result<u32, StoreError> {
        let slot = u32::try_from(id.raw()).map_err(|_| StoreError::UnknownVertex(id))?;
        if self.new_vertices.contains_key(&slot) || self.shared.data.read().has_vertex(slot) {
            Ok(slot)
        } else {
            Err(StoreError::UnknownVertex(id))
        }
    }

    fn edge_slot(&self, handle: EdgeHandle) -> Result<u32, StoreError> {
        let slot = u32::try_from(handle.raw()).map_err(|_| StoreError::UnknownEdge(handle))?;
        if self.new_edges.contains(&slot) || self.shared.data.read().has_edge(slot) {
            Ok(slot)
        } else {
            Err(StoreError::UnknownEdge(handle))
        }
    }

    fn discard(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        self.new_vertices.clear();
        self.new_edges.clear();
        dropped
    }

    fn validate(&self) -> Result<(), StoreError> {
        let schema = &self.shared.schema;
        for label in self.new_vertices.values() {
            schema.check_vertex(label.as_deref())?;
        }
        Ok(())
    }
}

impl GraphStore for MemorySession {
    fn insert_vertex(&mut self) -> Result<StoreId, StoreError> {
        self.live()?;
        let id = allocate(&self.shared.next_vertex, "vertex")?;
        self.pending.push(Op::InsertVertex(id));
        self.new_vertices.insert(id, None);
        Ok(StoreId::new(id as u64))
    }

    fn insert_edge(
        &mut self,
        src: StoreId,
        dst: StoreId,
        label: &str,
    ) -> Result<EdgeHandle, StoreError> {
        self.live()?;
        self.shared.schema.check_edge(label)?;
        let src = self.vertex_slot(src)?;
        let dst = self.vertex_slot(dst)?;
        let id = allocate(&self.shared.next_edge, "edge")?;
        let label = self.shared.interner.intern(label);
        self.pending.push(Op::InsertEdge { id, src, dst, label });
        self.new_edges.insert(id);
        Ok(EdgeHandle::new(id as u64))
    }

    fn set_property(
        &mut self,
        handle: ElementHandle,
        key: &str,
        value: &PropValue,
    ) -> Result<(), StoreError> {
        self.live()?;
        let op = match handle {
            ElementHandle::Vertex(vertex) => {
                let id = self.vertex_slot(vertex)?;
                let value = if key == LABEL_KEY {
                    // Labels are always indexed as text.
                    let label = value.to_string();
                    match self.new_vertices.get_mut(&id) {
                        Some(slot) => *slot = Some(label.clone()),
                        None => self.shared.schema.check_vertex(Some(&label))?,
                    }
                    StoredValue::Text(label)
                } else {
                    StoredValue::from(value)
                };
                Op::VertexProperty {
                    id,
                    key: self.shared.interner.intern(key),
                    value,
                }
            }
            ElementHandle::Edge(edge) => Op::EdgeProperty {
                id: self.edge_slot(edge)?,
                key: self.shared.interner.intern(key),
                value: StoredValue::from(value),
            },
        };
        self.pending.push(op);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.live()?;
        if let Err(e) = self.validate() {
            let dropped = self.discard();
            tracing::warn!(error = %e, dropped, "commit rejected; batch discarded");
            return Err(e);
        }
        let ops = std::mem::take(&mut self.pending);
        let applied = ops.len();
        {
            let shared = &self.shared;
            shared.data.write().apply(ops, shared.keys, &shared.interner);
        }
        self.discard();
        self.commits += 1;
        tracing::debug!(applied, commits = self.commits, "session commit");
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if self.closed {
            return Ok(());
        }
        let dropped = self.discard();
        if dropped > 0 {
            tracing::debug!(dropped, "session closed with uncommitted writes");
        }
        self.closed = true;
        Ok(())
    }
}

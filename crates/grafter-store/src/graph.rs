//! Committed graph state and its indexes.

use crate::interner::{StringInterner, Sym};
use grafter_model::{EdgeHandle, PropValue, PropertyMap, StoreId};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Property value as stored. Tagged so binary snapshots can decode it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum StoredValue {
    Bool(bool),
    Long(i64),
    Double(f64),
    Text(String),
}

impl From<&PropValue> for StoredValue {
    fn from(value: &PropValue) -> Self {
        match value {
            PropValue::Bool(b) => StoredValue::Bool(*b),
            PropValue::Long(n) => StoredValue::Long(*n),
            PropValue::Double(x) => StoredValue::Double(*x),
            PropValue::Text(s) => StoredValue::Text(s.clone()),
        }
    }
}

impl From<&StoredValue> for PropValue {
    fn from(value: &StoredValue) -> Self {
        match value {
            StoredValue::Bool(b) => PropValue::Bool(*b),
            StoredValue::Long(n) => PropValue::Long(*n),
            StoredValue::Double(x) => PropValue::Double(*x),
            StoredValue::Text(s) => PropValue::Text(s.clone()),
        }
    }
}

type Props = BTreeMap<Sym, StoredValue>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct VertexRecord {
    pub props: Props,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EdgeRecord {
    pub src: u32,
    pub dst: u32,
    pub label: Sym,
    pub props: Props,
}

/// A buffered write, applied at commit.
#[derive(Debug, Clone)]
pub(crate) enum Op {
    InsertVertex(u32),
    InsertEdge { id: u32, src: u32, dst: u32, label: Sym },
    VertexProperty { id: u32, key: Sym, value: StoredValue },
    EdgeProperty { id: u32, key: Sym, value: StoredValue },
}

/// Committed vertices and edges, indexed by label and adjacency.
///
/// Slots are indexed by id. Ids are handed out before commit, so a slot may
/// stay empty when its session never commits.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct GraphData {
    vertices: Vec<Option<VertexRecord>>,
    edges: Vec<Option<EdgeRecord>>,
    /// Vertex label -> vertex ids
    label_index: HashMap<Sym, RoaringBitmap>,
    /// Edge label -> edge ids
    edge_label_index: HashMap<Sym, RoaringBitmap>,
    /// Source vertex -> edge ids
    out_index: HashMap<u32, RoaringBitmap>,
    /// Target vertex -> edge ids
    in_index: HashMap<u32, RoaringBitmap>,
    /// Raw id text -> vertex id
    raw_ids: HashMap<String, u32>,
    vertex_count: u64,
    edge_count: u64,
}

/// The interned keys the store indexes on.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IndexedKeys {
    pub label: Sym,
    pub raw_id: Sym,
}

fn slot<T>(slots: &mut Vec<Option<T>>, id: u32) -> &mut Option<T> {
    let index = id as usize;
    if index >= slots.len() {
        slots.resize_with(index + 1, || None);
    }
    &mut slots[index]
}

impl GraphData {
    pub fn has_vertex(&self, id: u32) -> bool {
        matches!(self.vertices.get(id as usize), Some(Some(_)))
    }

    pub fn has_edge(&self, id: u32) -> bool {
        matches!(self.edges.get(id as usize), Some(Some(_)))
    }

    pub fn vertex_count(&self) -> u64 {
        self.vertex_count
    }

    pub fn edge_count(&self) -> u64 {
        self.edge_count
    }

    /// Apply one validated batch.
    pub fn apply(&mut self, ops: Vec<Op>, keys: IndexedKeys, interner: &StringInterner) {
        for op in ops {
            match op {
                Op::InsertVertex(id) => {
                    *slot(&mut self.vertices, id) = Some(VertexRecord::default());
                    self.vertex_count += 1;
                }
                Op::InsertEdge { id, src, dst, label } => {
                    *slot(&mut self.edges, id) = Some(EdgeRecord {
                        src,
                        dst,
                        label,
                        props: Props::new(),
                    });
                    self.out_index.entry(src).or_default().insert(id);
                    self.in_index.entry(dst).or_default().insert(id);
                    self.edge_label_index.entry(label).or_default().insert(id);
                    self.edge_count += 1;
                }
                Op::VertexProperty { id, key, value } => {
                    let Some(Some(record)) = self.vertices.get_mut(id as usize) else {
                        continue;
                    };
                    let previous = record.props.insert(key, value.clone());
                    if key == keys.label {
                        if let Some(StoredValue::Text(old)) = previous {
                            if let Some(ids) = interner.id_of(&old).and_then(|s| self.label_index.get_mut(&s)) {
                                ids.remove(id);
                            }
                        }
                        if let StoredValue::Text(label) = &value {
                            self.label_index.entry(interner.intern(label)).or_default().insert(id);
                        }
                    } else if key == keys.raw_id {
                        if let StoredValue::Text(raw) = value {
                            self.raw_ids.insert(raw, id);
                        }
                    }
                }
                Op::EdgeProperty { id, key, value } => {
                    if let Some(Some(record)) = self.edges.get_mut(id as usize) {
                        record.props.insert(key, value);
                    }
                }
            }
        }
    }

    pub fn vertices_with_label(&self, label: Option<Sym>) -> RoaringBitmap {
        label
            .and_then(|s| self.label_index.get(&s))
            .cloned()
            .unwrap_or_default()
    }

    pub fn raw_id(&self, raw: &str) -> Option<u32> {
        self.raw_ids.get(raw).copied()
    }

    pub fn vertex_view(&self, id: u32, keys: IndexedKeys, interner: &StringInterner) -> Option<VertexView> {
        let record = self.vertices.get(id as usize)?.as_ref()?;
        let text = |key: Sym| match record.props.get(&key) {
            Some(StoredValue::Text(s)) => Some(s.clone()),
            _ => None,
        };
        Some(VertexView {
            id: StoreId::new(id as u64),
            label: text(keys.label),
            raw_id: text(keys.raw_id),
            props: resolve_props(&record.props, interner),
        })
    }

    pub fn edge_view(&self, id: u32, interner: &StringInterner) -> Option<EdgeView> {
        let record = self.edges.get(id as usize)?.as_ref()?;
        Some(EdgeView {
            handle: EdgeHandle::new(id as u64),
            src: StoreId::new(record.src as u64),
            dst: StoreId::new(record.dst as u64),
            label: interner.lookup(record.label).unwrap_or_default(),
            props: resolve_props(&record.props, interner),
        })
    }

    pub fn outgoing(&self, vertex: u32) -> RoaringBitmap {
        self.out_index.get(&vertex).cloned().unwrap_or_default()
    }

    pub fn incoming(&self, vertex: u32) -> RoaringBitmap {
        self.in_index.get(&vertex).cloned().unwrap_or_default()
    }

    pub fn edges_with_label(&self, label: Option<Sym>) -> RoaringBitmap {
        label
            .and_then(|s| self.edge_label_index.get(&s))
            .cloned()
            .unwrap_or_default()
    }

    pub fn edge_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_some())
            .map(|(i, _)| i as u32)
    }

    pub fn vertex_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_some())
            .map(|(i, _)| i as u32)
    }

    /// One past the highest vertex and edge slot.
    pub fn high_water(&self) -> (u32, u32) {
        (self.vertices.len() as u32, self.edges.len() as u32)
    }
}

fn resolve_props(props: &Props, interner: &StringInterner) -> PropertyMap {
    props
        .iter()
        .filter_map(|(k, v)| Some((interner.lookup(*k)?, PropValue::from(v))))
        .collect()
}

/// A committed vertex with its properties resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexView {
    pub id: StoreId,
    pub label: Option<String>,
    pub raw_id: Option<String>,
    pub props: PropertyMap,
}

/// A committed edge with its properties resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeView {
    pub handle: EdgeHandle,
    pub src: StoreId,
    pub dst: StoreId,
    pub label: String,
    pub props: PropertyMap,
}

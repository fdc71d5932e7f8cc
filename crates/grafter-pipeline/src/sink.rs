//! Loading into an external graph store that assigns its own ids.
//!
//! ```text
//! pass 1  key = vertex id | edge src
//!         dedup, insert vertices, tag edges with the src store id
//!         emit  (vertex id -> Vertex{store id})  (edge dst -> Edge{src store id})
//! ── barrier ──
//! pass 2  key = vertex id | edge dst
//!         recover the dst store id from the group's vertex record
//!         insert edges, commit every `commit_batch` writes and at the end
//! ```
//!
//! No global id map is ever built: a store id only travels with the records
//! that are shuffled next to it. Any store error aborts the run.

use crate::config::PipelineConfig;
use crate::counters::{self, Counters};
use crate::error::{ConfigError, Result};
use crate::join::{GroupScanLookup, JoinState};
use crate::merge::GraphElementMerger;
use crate::substrate::{Reducer, Substrate};
use grafter_model::{
    is_reserved_key, Edge, EdgeHandle, ElementHandle, GraphElement, GraphStore, PropValue,
    PropertyMap, StoreConnector, StoreId, Vertex, VertexId, LABEL_KEY, RAW_ID_KEY,
};

// ============================================================================
// Sessions
// ============================================================================

/// One worker's session against the store.
///
/// Counts writes and commits every `commit_batch` of them. The session is
/// closed when the guard is dropped, on success and error paths alike;
/// uncommitted writes are then discarded by the store.
pub struct StoreSession<'c, S: GraphStore> {
    store: S,
    commit_batch: usize,
    pending: usize,
    commits: u64,
    closed: bool,
    counters: &'c Counters,
}

impl<'c, S: GraphStore> StoreSession<'c, S> {
    pub fn open<C>(connector: &C, commit_batch: usize, counters: &'c Counters) -> Result<Self>
    where
        C: StoreConnector<Store = S>,
    {
        if commit_batch == 0 {
            return Err(ConfigError::ZeroCommitBatch.into());
        }
        Ok(Self {
            store: connector.connect()?,
            commit_batch,
            pending: 0,
            commits: 0,
            closed: false,
            counters,
        })
    }

    /// Insert `vertex` with its properties, its raw id and its label.
    ///
    /// User properties under a reserved key are dropped with a warning.
    pub fn insert_vertex(&mut self, vertex: &Vertex) -> Result<StoreId> {
        let id = self.store.insert_vertex()?;
        let handle = ElementHandle::Vertex(id);
        for (key, value) in &vertex.props {
            if is_reserved_key(key) {
                tracing::warn!(vertex = %vertex.id, key = %key, "dropping property with reserved name");
                self.counters.incr(counters::STORE_RESERVED_PROPS, 1);
                continue;
            }
            self.store.set_property(handle, key, value)?;
        }
        self.store
            .set_property(handle, RAW_ID_KEY, &PropValue::Text(vertex.id.raw_id()))?;
        if let Some(label) = &vertex.id.label {
            self.store
                .set_property(handle, LABEL_KEY, &PropValue::Text(label.clone()))?;
        }
        self.counters.incr(counters::STORE_VERTICES, 1);
        self.wrote()?;
        Ok(id)
    }

    pub fn insert_edge(&mut self, src: StoreId, dst: StoreId, edge: &Edge) -> Result<EdgeHandle> {
        let handle = self.store.insert_edge(src, dst, &edge.id.label)?;
        self.write_props(ElementHandle::Edge(handle), &edge.props)?;
        self.counters.incr(counters::STORE_EDGES, 1);
        self.wrote()?;
        Ok(handle)
    }

    fn write_props(&mut self, handle: ElementHandle, props: &PropertyMap) -> Result<()> {
        for (key, value) in props {
            self.store.set_property(handle, key, value)?;
        }
        Ok(())
    }

    fn wrote(&mut self) -> Result<()> {
        self.pending += 1;
        if self.pending >= self.commit_batch {
            self.commit()?;
        }
        Ok(())
    }

    /// Commit pending writes, if any.
    pub fn commit(&mut self) -> Result<()> {
        if self.pending == 0 {
            return Ok(());
        }
        self.store.commit()?;
        self.pending = 0;
        self.commits += 1;
        self.counters.incr(counters::STORE_COMMITS, 1);
        Ok(())
    }

    pub fn commits(&self) -> u64 {
        self.commits
    }

    /// Commit what is pending and close.
    pub fn finish(&mut self) -> Result<()> {
        self.commit()?;
        self.closed = true;
        self.store.close()?;
        Ok(())
    }
}

impl<S: GraphStore> Drop for StoreSession<'_, S> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.store.close() {
            tracing::warn!(error = %err, pending = self.pending, "failed to close store session");
        }
    }
}

// ============================================================================
// Passes
// ============================================================================

/// A record travelling from pass 1 to pass 2.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkRecord {
    /// An inserted vertex, keyed by its own id.
    Vertex { id: VertexId, store_id: StoreId },
    /// An edge whose source is already resolved, keyed by its target.
    Edge { src: StoreId, edge: Edge },
}

/// Counts of one sink run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkOutcome {
    pub vertices: u64,
    pub edges: u64,
}

pub struct ExternalSinkIdPropagator<'a, C: StoreConnector> {
    connector: &'a C,
    merger: &'a GraphElementMerger,
    commit_batch: usize,
    counters: &'a Counters,
}

impl<'a, C: StoreConnector> ExternalSinkIdPropagator<'a, C> {
    pub fn new(
        connector: &'a C,
        merger: &'a GraphElementMerger,
        commit_batch: usize,
        counters: &'a Counters,
    ) -> Self {
        Self {
            connector,
            merger,
            commit_batch,
            counters,
        }
    }

    pub fn from_config(
        connector: &'a C,
        merger: &'a GraphElementMerger,
        config: &PipelineConfig,
        counters: &'a Counters,
    ) -> Self {
        Self::new(connector, merger, config.commit_batch, counters)
    }

    /// Insert every vertex, then every edge whose endpoints were both
    /// inserted.
    pub fn run<S: Substrate>(&self, substrate: &S, elements: Vec<GraphElement>) -> Result<SinkOutcome> {
        if self.commit_batch == 0 {
            return Err(ConfigError::ZeroCommitBatch.into());
        }
        let tagged = self.insert_vertices(substrate, elements)?;
        let vertices = tagged
            .iter()
            .filter(|(_, record)| matches!(record, SinkRecord::Vertex { .. }))
            .count() as u64;
        let edges = self.insert_edges(substrate, tagged)?;
        tracing::info!(
            vertices,
            edges,
            commits = self.counters.get(counters::STORE_COMMITS),
            misses = self.counters.get(counters::RESOLUTION_MISSES),
            "loaded graph into store"
        );
        Ok(SinkOutcome { vertices, edges })
    }

    /// Pass 1.
    pub fn insert_vertices<S: Substrate>(
        &self,
        substrate: &S,
        elements: Vec<GraphElement>,
    ) -> Result<Vec<(VertexId, SinkRecord)>> {
        let out = substrate.run_pass(
            "sink_vertices",
            elements,
            |element, emit| {
                let key = match &element {
                    GraphElement::Vertex(v) => v.id.clone(),
                    GraphElement::Edge(e) => e.id.src.clone(),
                };
                emit.emit(key, element);
                Ok(())
            },
            |_partition| {
                Ok(VertexInserter {
                    session: StoreSession::open(self.connector, self.commit_batch, self.counters)?,
                    merger: self.merger,
                    state: JoinState::new(GroupScanLookup::new(), self.counters),
                })
            },
        )?;
        Ok(out.into_iter().flatten().collect())
    }

    /// Pass 2. Returns the number of edges inserted.
    pub fn insert_edges<S: Substrate>(
        &self,
        substrate: &S,
        tagged: Vec<(VertexId, SinkRecord)>,
    ) -> Result<u64> {
        let out = substrate.run_pass(
            "sink_edges",
            tagged,
            |(key, record), emit| {
                emit.emit(key, record);
                Ok(())
            },
            |_partition| {
                Ok(EdgeInserter {
                    session: StoreSession::open(self.connector, self.commit_batch, self.counters)?,
                    state: JoinState::new(GroupScanLookup::new(), self.counters),
                    inserted: 0,
                })
            },
        )?;
        Ok(out.into_iter().flatten().sum())
    }
}

struct VertexInserter<'a, S: GraphStore> {
    session: StoreSession<'a, S>,
    merger: &'a GraphElementMerger,
    state: JoinState<'a, GroupScanLookup>,
}

impl<S: GraphStore + Send> Reducer for VertexInserter<'_, S> {
    type Key = VertexId;
    type Value = GraphElement;
    type Output = (VertexId, SinkRecord);

    fn reduce(&mut self, key: VertexId, values: Vec<GraphElement>, out: &mut Vec<Self::Output>) -> Result<()> {
        let merged = self.merger.merge(values);

        let mut inserted = Vec::with_capacity(merged.vertices.len());
        for vertex in &merged.vertices {
            let store_id = self.session.insert_vertex(vertex)?;
            inserted.push((vertex.id.clone(), store_id));
        }

        if !merged.edges.is_empty() {
            self.state.ensure_loaded(&key, &inserted[..])?;
            for edge in merged.edges {
                let record = edge.id.to_string();
                if let Some(src) = self.state.resolve(&edge.id.src, &record, 1) {
                    out.push((edge.id.dst.clone(), SinkRecord::Edge { src, edge }));
                }
            }
        }

        out.extend(
            inserted
                .into_iter()
                .map(|(id, store_id)| (id.clone(), SinkRecord::Vertex { id, store_id })),
        );
        Ok(())
    }

    fn finish(&mut self, _out: &mut Vec<Self::Output>) -> Result<()> {
        self.session.finish()
    }
}

struct EdgeInserter<'a, S: GraphStore> {
    session: StoreSession<'a, S>,
    state: JoinState<'a, GroupScanLookup>,
    inserted: u64,
}

impl<S: GraphStore + Send> Reducer for EdgeInserter<'_, S> {
    type Key = VertexId;
    type Value = SinkRecord;
    type Output = u64;

    fn reduce(&mut self, key: VertexId, values: Vec<SinkRecord>, _out: &mut Vec<u64>) -> Result<()> {
        let mut vertices = Vec::new();
        let mut edges = Vec::new();
        for record in values {
            match record {
                SinkRecord::Vertex { id, store_id } => vertices.push((id, store_id)),
                SinkRecord::Edge { src, edge } => edges.push((src, edge)),
            }
        }
        if edges.is_empty() {
            return Ok(());
        }

        self.state.ensure_loaded(&key, &vertices[..])?;
        let record = edges[0].1.id.to_string();
        let Some(dst) = self.state.resolve(&key, &record, edges.len() as u64) else {
            return Ok(());
        };
        for (src, edge) in &edges {
            self.session.insert_edge(*src, dst, edge)?;
            self.inserted += 1;
        }
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<u64>) -> Result<()> {
        self.session.finish()?;
        out.push(self.inserted);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combine::KeepFirst;
    use crate::error::PipelineError;
    use crate::substrate::LocalSubstrate;
    use grafter_model::{props, EdgeId, StoreError};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Vertex(StoreId),
        Edge(StoreId, StoreId, String),
        Prop(ElementHandle, String, PropValue),
        Commit,
        Close,
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Event>>,
        next: Mutex<u64>,
        fail_edges: bool,
    }

    struct RecordingStore(Arc<Recorder>);

    impl GraphStore for RecordingStore {
        fn insert_vertex(&mut self) -> Result<StoreId, StoreError> {
            let id = {
                let mut next = self.0.next.lock();
                *next += 1;
                StoreId::new(*next)
            };
            self.0.events.lock().push(Event::Vertex(id));
            Ok(id)
        }

        fn insert_edge(&mut self, src: StoreId, dst: StoreId, label: &str) -> Result<EdgeHandle, StoreError> {
            if self.0.fail_edges {
                return Err(StoreError::Commit("edge table is read-only".into()));
            }
            self.0.events.lock().push(Event::Edge(src, dst, label.to_string()));
            Ok(EdgeHandle::new(src.raw() * 1000 + dst.raw()))
        }

        fn set_property(&mut self, handle: ElementHandle, key: &str, value: &PropValue) -> Result<(), StoreError> {
            self.0
                .events
                .lock()
                .push(Event::Prop(handle, key.to_string(), value.clone()));
            Ok(())
        }

        fn commit(&mut self) -> Result<(), StoreError> {
            self.0.events.lock().push(Event::Commit);
            Ok(())
        }

        fn close(&mut self) -> Result<(), StoreError> {
            self.0.events.lock().push(Event::Close);
            Ok(())
        }
    }

    struct RecordingConnector(Arc<Recorder>);

    impl StoreConnector for RecordingConnector {
        type Store = RecordingStore;

        fn connect(&self) -> Result<RecordingStore, StoreError> {
            Ok(RecordingStore(Arc::clone(&self.0)))
        }
    }

    fn graph() -> Vec<GraphElement> {
        let v = |n: &str| VertexId::new(n);
        let mut out: Vec<GraphElement> = ["a", "b", "c"]
            .iter()
            .map(|n| Vertex::with_props(v(n), props([("name", *n)])).into())
            .collect();
        for (s, d) in [("a", "b"), ("b", "c"), ("c", "a"), ("a", "c")] {
            out.push(Edge::with_props(EdgeId::new(v(s), v(d), "link"), props([("w", 1i64)])).into());
        }
        out
    }

    fn run(recorder: &Arc<Recorder>, elements: Vec<GraphElement>, batch: usize) -> Result<SinkOutcome> {
        let substrate = LocalSubstrate::new(3, 2).unwrap();
        let merger = GraphElementMerger::new(false, Arc::new(KeepFirst), Arc::new(KeepFirst));
        let counters = Counters::new();
        let connector = RecordingConnector(Arc::clone(recorder));
        ExternalSinkIdPropagator::new(&connector, &merger, batch, &counters).run(&substrate, elements)
    }

    #[test]
    fn edges_connect_the_ids_returned_for_their_endpoints() {
        let recorder = Arc::new(Recorder::default());
        let outcome = run(&recorder, graph(), 100).unwrap();
        assert_eq!(outcome, SinkOutcome { vertices: 3, edges: 4 });

        let events = recorder.events.lock().clone();
        let mut names: HashMap<StoreId, String> = HashMap::new();
        for event in &events {
            if let Event::Prop(ElementHandle::Vertex(id), key, PropValue::Text(raw)) = event {
                if key == RAW_ID_KEY {
                    names.insert(*id, raw.clone());
                }
            }
        }
        let mut edges: Vec<(String, String)> = events
            .iter()
            .filter_map(|e| match e {
                Event::Edge(s, d, _) => Some((names[s].clone(), names[d].clone())),
                _ => None,
            })
            .collect();
        edges.sort();
        let expected: Vec<(String, String)> = [("a", "b"), ("a", "c"), ("b", "c"), ("c", "a")]
            .iter()
            .map(|(s, d)| (s.to_string(), d.to_string()))
            .collect();
        assert_eq!(edges, expected);
    }

    #[test]
    fn every_vertex_precedes_every_edge() {
        let recorder = Arc::new(Recorder::default());
        run(&recorder, graph(), 100).unwrap();
        let events = recorder.events.lock().clone();
        let last_vertex = events.iter().rposition(|e| matches!(e, Event::Vertex(_))).unwrap();
        let first_edge = events.iter().position(|e| matches!(e, Event::Edge(..))).unwrap();
        assert!(last_vertex < first_edge);
        // Edge properties are written after their edge.
        let first_edge_prop = events
            .iter()
            .position(|e| matches!(e, Event::Prop(ElementHandle::Edge(_), _, _)))
            .unwrap();
        assert!(first_edge < first_edge_prop);
    }

    #[test]
    fn sessions_commit_in_batches_and_always_close() {
        let recorder = Arc::new(Recorder::default());
        run(&recorder, graph(), 1).unwrap();
        let events = recorder.events.lock().clone();
        let commits = events.iter().filter(|e| **e == Event::Commit).count();
        let closes = events.iter().filter(|e| **e == Event::Close).count();
        // One commit per write with a batch of one.
        assert_eq!(commits, 7);
        assert!(closes >= 2);
    }

    #[test]
    fn dangling_edges_are_dropped() {
        let recorder = Arc::new(Recorder::default());
        let mut elements = graph();
        elements.push(Edge::new(EdgeId::new(VertexId::new("a"), VertexId::new("zed"), "link")).into());
        elements.push(Edge::new(EdgeId::new(VertexId::new("ghost"), VertexId::new("a"), "link")).into());
        let outcome = run(&recorder, elements, 100).unwrap();
        assert_eq!(outcome.edges, 4);
    }

    #[test]
    fn reserved_property_names_do_not_shadow_bookkeeping() {
        let recorder = Arc::new(Recorder::default());
        let id = VertexId::labeled("a", "person");
        let forged = Vertex::with_props(
            id.clone(),
            props([(RAW_ID_KEY, "forged"), (LABEL_KEY, "robot"), ("name", "a")]),
        );
        run(&recorder, vec![forged.into()], 100).unwrap();

        let written: Vec<(String, PropValue)> = recorder
            .events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Prop(_, key, value) => Some((key.clone(), value.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(written.len(), 3);
        assert!(written.contains(&(RAW_ID_KEY.to_string(), PropValue::Text(id.raw_id()))));
        assert!(written.contains(&(LABEL_KEY.to_string(), PropValue::from("person"))));
        assert!(!written.iter().any(|(_, v)| *v == PropValue::from("forged")));
    }

    #[test]
    fn store_errors_are_fatal_and_sessions_still_close() {
        let recorder = Arc::new(Recorder {
            fail_edges: true,
            ..Recorder::default()
        });
        let err = run(&recorder, graph(), 100).unwrap_err();
        assert!(matches!(err, PipelineError::Store(StoreError::Commit(_))));
        let events = recorder.events.lock().clone();
        let opened_pass_two = events.iter().filter(|e| **e == Event::Close).count();
        assert!(opened_pass_two >= 1);
        assert!(!events.iter().any(|e| matches!(e, Event::Edge(..))));
    }
}

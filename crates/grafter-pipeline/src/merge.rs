//! Key-grouped deduplication of graph elements.
//!
//! Given one group of elements the merger emits one vertex per distinct
//! [`VertexId`] and one edge per distinct [`EdgeId`], folding the property
//! maps of duplicates with the configured [`PropertyReducer`]s. Self-loops are
//! always dropped; with bidirectional cleaning the later-arriving direction of
//! each `(a,b,l)`/`(b,a,l)` pair is dropped as well.
//!
//! Which duplicate's value survives under `keep_first`, and which direction
//! survives bidirectional cleaning, follow group arrival order and are
//! therefore not stable across runs. That a duplicate is removed is.

use crate::combine::{PropertyReducer, ReducerRegistry};
use crate::config::PipelineConfig;
use crate::counters::{self, Counters};
use crate::error::Result;
use crate::substrate::Reducer;
use ahash::AHashMap;
use grafter_model::{Edge, EdgeId, GraphElement, Vertex, VertexId};
use std::sync::Arc;

/// Per-group merge counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub vertices: u64,
    pub edges: u64,
    pub duplicate_vertices: u64,
    pub duplicate_edges: u64,
    pub self_loops: u64,
    pub reverse_edges: u64,
}

impl MergeStats {
    pub fn record(&self, counters: &Counters) {
        counters.incr(counters::VERTICES_EMITTED, self.vertices);
        counters.incr(counters::EDGES_EMITTED, self.edges);
        counters.incr(counters::DUPLICATE_VERTICES, self.duplicate_vertices);
        counters.incr(counters::DUPLICATE_EDGES, self.duplicate_edges);
        counters.incr(counters::SELF_LOOPS_DROPPED, self.self_loops);
        counters.incr(counters::REVERSE_EDGES_DROPPED, self.reverse_edges);
    }
}

/// Deduplicated contents of one group, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Merged {
    pub vertices: Vec<Vertex>,
    pub edges: Vec<Edge>,
    pub stats: MergeStats,
}

impl Merged {
    pub fn into_elements(self) -> impl Iterator<Item = GraphElement> {
        self.vertices
            .into_iter()
            .map(GraphElement::Vertex)
            .chain(self.edges.into_iter().map(GraphElement::Edge))
    }
}

#[derive(Clone)]
pub struct GraphElementMerger {
    clean_bidirectional: bool,
    vertex_reducer: Arc<dyn PropertyReducer>,
    edge_reducer: Arc<dyn PropertyReducer>,
}

impl GraphElementMerger {
    pub fn new(
        clean_bidirectional: bool,
        vertex_reducer: Arc<dyn PropertyReducer>,
        edge_reducer: Arc<dyn PropertyReducer>,
    ) -> Self {
        Self {
            clean_bidirectional,
            vertex_reducer,
            edge_reducer,
        }
    }

    pub fn from_config(config: &PipelineConfig, registry: &ReducerRegistry) -> Result<Self> {
        Ok(Self::new(
            config.clean_bidirectional,
            registry.resolve(config.vertex_combiner.as_deref())?,
            registry.resolve(config.edge_combiner.as_deref())?,
        ))
    }

    pub fn cleans_bidirectional(&self) -> bool {
        self.clean_bidirectional
    }

    pub fn merge<I>(&self, group: I) -> Merged
    where
        I: IntoIterator<Item = GraphElement>,
    {
        let mut out = Merged::default();
        let mut vertex_slots: AHashMap<VertexId, usize> = AHashMap::new();
        let mut edge_slots: AHashMap<EdgeId, usize> = AHashMap::new();

        for element in group {
            match element {
                GraphElement::Vertex(vertex) => match vertex_slots.get(&vertex.id) {
                    Some(&slot) => {
                        let kept = &mut out.vertices[slot];
                        kept.props = self
                            .vertex_reducer
                            .reduce(std::mem::take(&mut kept.props), vertex.props);
                        out.stats.duplicate_vertices += 1;
                    }
                    None => {
                        vertex_slots.insert(vertex.id.clone(), out.vertices.len());
                        out.vertices.push(vertex);
                    }
                },
                GraphElement::Edge(edge) => {
                    if edge.id.is_self_loop() {
                        out.stats.self_loops += 1;
                        continue;
                    }
                    if let Some(&slot) = edge_slots.get(&edge.id) {
                        let kept = &mut out.edges[slot];
                        kept.props = self
                            .edge_reducer
                            .reduce(std::mem::take(&mut kept.props), edge.props);
                        out.stats.duplicate_edges += 1;
                        continue;
                    }
                    if self.clean_bidirectional && edge_slots.contains_key(&edge.id.reversed()) {
                        out.stats.reverse_edges += 1;
                        continue;
                    }
                    edge_slots.insert(edge.id.clone(), out.edges.len());
                    out.edges.push(edge);
                }
            }
        }

        out.stats.vertices = out.vertices.len() as u64;
        out.stats.edges = out.edges.len() as u64;
        out
    }
}

/// Shuffle key for the initial merge pass.
///
/// Vertices group under their own id. Edges group under the smaller of their
/// endpoints, so both directions of a pair and every copy of an edge share a
/// group.
pub fn merge_key(element: &GraphElement) -> VertexId {
    match element {
        GraphElement::Vertex(v) => v.id.clone(),
        GraphElement::Edge(e) => std::cmp::min(&e.id.src, &e.id.dst).clone(),
    }
}

/// Substrate reducer running the merger over each group of a partition.
pub struct MergeReducer<'a> {
    merger: &'a GraphElementMerger,
    counters: &'a Counters,
}

impl<'a> MergeReducer<'a> {
    pub fn new(merger: &'a GraphElementMerger, counters: &'a Counters) -> Self {
        Self { merger, counters }
    }
}

impl Reducer for MergeReducer<'_> {
    type Key = VertexId;
    type Value = GraphElement;
    type Output = GraphElement;

    fn reduce(
        &mut self,
        _key: VertexId,
        values: Vec<GraphElement>,
        out: &mut Vec<GraphElement>,
    ) -> Result<()> {
        let merged = self.merger.merge(values);
        merged.stats.record(self.counters);
        out.extend(merged.into_elements());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combine::{KeepFirst, Sum};
    use grafter_model::{props, PropValue};

    fn v(name: &str) -> VertexId {
        VertexId::new(name)
    }

    fn edge(src: &str, dst: &str, label: &str) -> GraphElement {
        Edge::new(EdgeId::new(v(src), v(dst), label)).into()
    }

    fn merger(clean: bool) -> GraphElementMerger {
        GraphElementMerger::new(clean, Arc::new(KeepFirst), Arc::new(KeepFirst))
    }

    #[test]
    fn duplicate_vertices_fold_properties() {
        let sum = GraphElementMerger::new(false, Arc::new(Sum), Arc::new(KeepFirst));
        let group = vec![
            Vertex::with_props(v("a"), props([("n", 1i64)])).into(),
            Vertex::with_props(v("a"), props([("n", 2i64), ("m", 7)])).into(),
            Vertex::new(v("b")).into(),
        ];
        let merged = sum.merge(group);
        assert_eq!(merged.vertices.len(), 2);
        assert_eq!(merged.vertices[0].props["n"], PropValue::Long(3));
        assert_eq!(merged.vertices[0].props["m"], PropValue::Long(7));
        assert_eq!(merged.stats.duplicate_vertices, 1);
    }

    #[test]
    fn labels_distinguish_vertices() {
        let group = vec![
            Vertex::new(VertexId::labeled("x", "person")).into(),
            Vertex::new(VertexId::labeled("x", "city")).into(),
        ];
        assert_eq!(merger(false).merge(group).vertices.len(), 2);
    }

    #[test]
    fn self_loops_are_dropped() {
        let merged = merger(false).merge(vec![edge("a", "a", "knows"), edge("a", "b", "knows")]);
        assert_eq!(merged.edges.len(), 1);
        assert_eq!(merged.stats.self_loops, 1);
    }

    #[test]
    fn both_directions_survive_without_cleaning() {
        let merged = merger(false).merge(vec![edge("a", "b", "knows"), edge("b", "a", "knows")]);
        assert_eq!(merged.edges.len(), 2);
    }

    #[test]
    fn cleaning_keeps_first_direction() {
        let merged = merger(true).merge(vec![
            edge("b", "a", "knows"),
            edge("a", "b", "knows"),
            edge("b", "a", "knows"),
        ]);
        assert_eq!(merged.edges.len(), 1);
        assert_eq!(merged.edges[0].id.src, v("b"));
        assert_eq!(merged.stats.reverse_edges, 1);
        assert_eq!(merged.stats.duplicate_edges, 1);
    }

    #[test]
    fn cleaning_respects_labels() {
        let merged = merger(true).merge(vec![edge("a", "b", "knows"), edge("b", "a", "likes")]);
        assert_eq!(merged.edges.len(), 2);
    }

    #[test]
    fn merge_key_colocates_both_directions() {
        assert_eq!(merge_key(&edge("b", "a", "x")), merge_key(&edge("a", "b", "x")));
        assert_eq!(merge_key(&Vertex::new(v("q")).into()), v("q"));
    }
}

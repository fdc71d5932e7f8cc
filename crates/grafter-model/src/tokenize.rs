//! Tokenizer and record-classifier seams.
//!
//! Raw-format front ends live outside the core; the pipeline only needs each
//! record to yield a finite set of vertices and edges, and isomorphic records
//! to yield equal ids on every run.

use crate::{Edge, GraphElement, ParseError, Vertex};

/// Elements produced from one raw record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tokens {
    pub vertices: Vec<Vertex>,
    pub edges: Vec<Edge>,
}

impl Tokens {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.edges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vertices.len() + self.edges.len()
    }

    pub fn into_elements(self) -> impl Iterator<Item = GraphElement> {
        self.vertices
            .into_iter()
            .map(GraphElement::Vertex)
            .chain(self.edges.into_iter().map(GraphElement::Edge))
    }
}

/// Decides which kind of element a raw line describes.
pub trait RecordClassifier {
    fn is_vertex_record(&self, line: &str) -> bool;
    fn is_edge_record(&self, line: &str) -> bool;
}

/// Turns one raw record into graph elements.
pub trait Tokenizer: Send + Sync {
    /// Short registry name (`"tsv"`, `"jsonl"`, ...).
    fn name(&self) -> &'static str;

    fn tokenize(&self, record: &str) -> Result<Tokens, ParseError>;
}

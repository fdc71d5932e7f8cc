//! JSON-lines graph records.
//!
//! Each line is one object, either a vertex with optional outgoing links:
//!
//! ```json
//! {"id": "ada", "label": "person", "props": {"age": 36},
//!  "links": [{"to": "london", "to_label": "city", "label": "lives_in"}]}
//! ```
//!
//! or a standalone edge:
//!
//! ```json
//! {"edge": {"src": "ada", "src_label": "person", "dst": 7, "label": "owns"}}
//! ```
//!
//! Ids may be strings or integers.

use grafter_model::{
    Edge, EdgeId, ParseError, PropertyMap, RecordClassifier, Tokenizer, Tokens, Vertex, VertexId,
    VertexName,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonRecord {
    Edge { edge: JsonEdge },
    Vertex(JsonVertex),
}

#[derive(Debug, Deserialize)]
struct JsonVertex {
    id: VertexName,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    props: PropertyMap,
    #[serde(default)]
    links: Vec<JsonLink>,
}

#[derive(Debug, Deserialize)]
struct JsonLink {
    to: VertexName,
    #[serde(default)]
    to_label: Option<String>,
    #[serde(default)]
    label: String,
    #[serde(default)]
    props: PropertyMap,
}

#[derive(Debug, Deserialize)]
struct JsonEdge {
    src: VertexName,
    #[serde(default)]
    src_label: Option<String>,
    dst: VertexName,
    #[serde(default)]
    dst_label: Option<String>,
    #[serde(default)]
    label: String,
    #[serde(default)]
    props: PropertyMap,
}

fn vertex_id(name: VertexName, label: Option<String>) -> VertexId {
    VertexId { name, label }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonlTokenizer;

impl Tokenizer for JsonlTokenizer {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn tokenize(&self, record: &str) -> Result<Tokens, ParseError> {
        let mut tokens = Tokens::default();
        if record.trim().is_empty() {
            return Ok(tokens);
        }
        match serde_json::from_str::<JsonRecord>(record)? {
            JsonRecord::Edge { edge } => {
                let id = EdgeId::new(
                    vertex_id(edge.src, edge.src_label),
                    vertex_id(edge.dst, edge.dst_label),
                    edge.label,
                );
                tokens.edges.push(Edge::with_props(id, edge.props));
            }
            JsonRecord::Vertex(vertex) => {
                let id = vertex_id(vertex.id, vertex.label);
                for link in vertex.links {
                    let edge = EdgeId::new(id.clone(), vertex_id(link.to, link.to_label), link.label);
                    tokens.edges.push(Edge::with_props(edge, link.props));
                }
                tokens.vertices.push(Vertex::with_props(id, vertex.props));
            }
        }
        Ok(tokens)
    }
}

/// A record is an edge record when its top-level object has an `edge` key.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonlClassifier;

impl JsonlClassifier {
    fn top_level_keys(line: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
        match serde_json::from_str(line).ok()? {
            serde_json::Value::Object(map) => Some(map),
            _ => None,
        }
    }
}

impl RecordClassifier for JsonlClassifier {
    fn is_vertex_record(&self, line: &str) -> bool {
        Self::top_level_keys(line).is_some_and(|map| map.contains_key("id"))
    }

    fn is_edge_record(&self, line: &str) -> bool {
        Self::top_level_keys(line).is_some_and(|map| map.contains_key("edge"))
    }
}

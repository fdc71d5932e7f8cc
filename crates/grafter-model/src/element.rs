//! Graph elements and their serialized payloads.

use crate::{EdgeId, ParseError, PropertyMap, VertexId};
use serde::{Deserialize, Serialize};

/// A vertex: identity plus properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: VertexId,
    #[serde(default)]
    pub props: PropertyMap,
}

impl Vertex {
    pub fn new(id: VertexId) -> Self {
        Self {
            id,
            props: PropertyMap::new(),
        }
    }

    pub fn with_props(id: VertexId, props: PropertyMap) -> Self {
        Self { id, props }
    }

    /// The payload carried next to the raw id in vertex-list lines.
    pub fn data(&self) -> VertexData {
        VertexData {
            label: self.id.label.clone(),
            props: self.props.clone(),
        }
    }
}

/// An edge: identity plus properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    #[serde(default)]
    pub props: PropertyMap,
}

impl Edge {
    pub fn new(id: EdgeId) -> Self {
        Self {
            id,
            props: PropertyMap::new(),
        }
    }

    pub fn with_props(id: EdgeId, props: PropertyMap) -> Self {
        Self { id, props }
    }

    /// The payload carried next to the endpoints in edge lines.
    pub fn data(&self) -> EdgeData {
        EdgeData {
            label: self.id.label.clone(),
            props: self.props.clone(),
        }
    }
}

/// Either kind of element. Both travel through the same partitioned channel,
/// so every stage dispatches on this tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphElement {
    Vertex(Vertex),
    Edge(Edge),
}

impl GraphElement {
    pub fn is_vertex(&self) -> bool {
        matches!(self, GraphElement::Vertex(_))
    }

    pub fn props(&self) -> &PropertyMap {
        match self {
            GraphElement::Vertex(v) => &v.props,
            GraphElement::Edge(e) => &e.props,
        }
    }
}

impl From<Vertex> for GraphElement {
    fn from(value: Vertex) -> Self {
        GraphElement::Vertex(value)
    }
}

impl From<Edge> for GraphElement {
    fn from(value: Edge) -> Self {
        GraphElement::Edge(value)
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Serialized vertex payload ("vertexData").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub props: PropertyMap,
}

impl VertexData {
    /// Fails only for a property holding a non-finite double.
    pub fn to_json(&self) -> Result<String, ParseError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ParseError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Serialized edge payload ("edgeData").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    pub label: String,
    #[serde(default)]
    pub props: PropertyMap,
}

impl EdgeData {
    pub fn to_json(&self) -> Result<String, ParseError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ParseError> {
        Ok(serde_json::from_str(text)?)
    }
}

//! Tab-separated line formats shared by every stage.
//!
//! ```text
//! vertex list      rawId        \t vertexData
//! renamed vertex   surrogateId  \t vertexData
//! dictionary       surrogateId  \t rawId
//! edge list        srcId        \t dstId        \t edgeData
//! ```
//!
//! Edge lines keep their payload as an opaque slice so joins can forward it
//! without re-serializing.

use crate::{Edge, EdgeData, EdgeId, ParseError, RecordClassifier, Vertex, VertexData, VertexId};

// ============================================================================
// Vertex lines
// ============================================================================

/// A vertex-list line split into its two fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexLine<'a> {
    pub key: &'a str,
    pub data: &'a str,
}

impl<'a> VertexLine<'a> {
    pub fn split(line: &'a str) -> Result<Self, ParseError> {
        let (key, data) = line
            .split_once('\t')
            .ok_or(ParseError::MissingField { field: "vertexData" })?;
        if key.is_empty() {
            return Err(ParseError::MissingField { field: "rawId" });
        }
        if data.contains('\t') {
            return Err(ParseError::Record(format!(
                "vertex line has more than two fields: {line}"
            )));
        }
        Ok(Self { key, data })
    }
}

pub fn encode_vertex(vertex: &Vertex) -> Result<String, ParseError> {
    Ok(format!("{}\t{}", vertex.id.raw_id(), vertex.data().to_json()?))
}

pub fn decode_vertex(line: &str) -> Result<Vertex, ParseError> {
    let fields = VertexLine::split(line)?;
    let id = VertexId::parse_raw(fields.key)?;
    let data = VertexData::from_json(fields.data)?;
    if data.label != id.label {
        return Err(ParseError::Record(format!(
            "payload label {:?} disagrees with id {id}",
            data.label
        )));
    }
    Ok(Vertex::with_props(id, data.props))
}

// ============================================================================
// Edge lines
// ============================================================================

/// An edge line split into its three fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeLine<'a> {
    pub src: &'a str,
    pub dst: &'a str,
    pub data: &'a str,
}

impl<'a> EdgeLine<'a> {
    pub fn split(line: &'a str) -> Result<Self, ParseError> {
        let mut fields = line.splitn(3, '\t');
        let src = fields.next().filter(|s| !s.is_empty());
        let dst = fields.next().filter(|s| !s.is_empty());
        let data = fields.next().filter(|s| !s.is_empty());
        match (src, dst, data) {
            (Some(src), Some(dst), Some(data)) if !data.contains('\t') => {
                Ok(Self { src, dst, data })
            }
            (None, _, _) => Err(ParseError::MissingField { field: "srcId" }),
            (_, None, _) => Err(ParseError::MissingField { field: "dstId" }),
            (_, _, None) => Err(ParseError::MissingField { field: "edgeData" }),
            _ => Err(ParseError::Record(format!(
                "edge line has more than three fields: {line}"
            ))),
        }
    }

    pub fn format(src: &str, dst: &str, data: &str) -> String {
        format!("{src}\t{dst}\t{data}")
    }
}

pub fn encode_edge(edge: &Edge) -> Result<String, ParseError> {
    Ok(EdgeLine::format(
        &edge.id.src.raw_id(),
        &edge.id.dst.raw_id(),
        &edge.data().to_json()?,
    ))
}

pub fn decode_edge(line: &str) -> Result<Edge, ParseError> {
    let fields = EdgeLine::split(line)?;
    let data = EdgeData::from_json(fields.data)?;
    let id = EdgeId::new(
        VertexId::parse_raw(fields.src)?,
        VertexId::parse_raw(fields.dst)?,
        data.label,
    );
    Ok(Edge::with_props(id, data.props))
}

/// An edge whose endpoints have both been rewritten to 64-bit ids.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEdge {
    pub src: u64,
    pub dst: u64,
    pub data: EdgeData,
}

impl ResolvedEdge {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let fields = EdgeLine::split(line)?;
        Ok(Self {
            src: parse_u64(fields.src)?,
            dst: parse_u64(fields.dst)?,
            data: EdgeData::from_json(fields.data)?,
        })
    }
}

// ============================================================================
// Dictionary lines
// ============================================================================

/// One `(surrogateId, rawId)` dictionary entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DictionaryEntry {
    pub surrogate: u64,
    pub raw_id: String,
}

impl DictionaryEntry {
    pub fn new(surrogate: u64, raw_id: impl Into<String>) -> Self {
        Self {
            surrogate,
            raw_id: raw_id.into(),
        }
    }

    pub fn to_line(&self) -> String {
        format!("{}\t{}", self.surrogate, self.raw_id)
    }

    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let (surrogate, raw_id) = line
            .split_once('\t')
            .ok_or(ParseError::MissingField { field: "rawId" })?;
        if raw_id.is_empty() || raw_id.contains('\t') {
            return Err(ParseError::Record(format!("bad dictionary line: {line}")));
        }
        Ok(Self {
            surrogate: parse_u64(surrogate)?,
            raw_id: raw_id.to_string(),
        })
    }
}

pub fn parse_u64(text: &str) -> Result<u64, ParseError> {
    text.parse::<u64>()
        .map_err(|_| ParseError::InvalidNumber(text.to_string()))
}

// ============================================================================
// Classification of list lines
// ============================================================================

/// Tells vertex-list lines (two fields) from edge-list lines (three fields).
#[derive(Debug, Clone, Copy, Default)]
pub struct ListRecordClassifier;

impl RecordClassifier for ListRecordClassifier {
    fn is_vertex_record(&self, line: &str) -> bool {
        line.matches('\t').count() == 1
    }

    fn is_edge_record(&self, line: &str) -> bool {
        line.matches('\t').count() == 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{props, PropValue};

    #[test]
    fn vertex_line_carries_label_and_props() {
        let v = Vertex::with_props(
            VertexId::labeled("ada", "person"),
            props([("age", PropValue::Long(36))]),
        );
        let line = encode_vertex(&v).unwrap();
        assert_eq!(line.matches('\t').count(), 1);
        assert_eq!(decode_vertex(&line).unwrap(), v);
    }

    #[test]
    fn empty_name_survives_the_list_formats() {
        let empty = VertexId::new("");
        let line = encode_vertex(&Vertex::new(empty.clone())).unwrap();
        assert_eq!(decode_vertex(&line).unwrap().id, empty);

        let edge = Edge::new(EdgeId::new(VertexId::new("a"), empty, "x"));
        let line = encode_edge(&edge).unwrap();
        assert_eq!(decode_edge(&line).unwrap(), edge);
    }

    #[test]
    fn non_finite_payloads_are_rejected() {
        let v = Vertex::with_props(VertexId::new("a"), props([("w", f64::INFINITY)]));
        assert!(matches!(encode_vertex(&v), Err(ParseError::Payload(_))));
    }

    #[test]
    fn edge_line_fields() {
        let line = "a\tb\t{\"label\":\"knows\",\"props\":{}}";
        let fields = EdgeLine::split(line).unwrap();
        assert_eq!(fields.src, "a");
        assert_eq!(fields.dst, "b");
        let edge = decode_edge(line).unwrap();
        assert_eq!(edge.id.label, "knows");
        assert!(edge.props.is_empty());
    }

    #[test]
    fn short_lines_name_the_missing_field() {
        assert!(matches!(
            EdgeLine::split("a\tb"),
            Err(ParseError::MissingField { field: "edgeData" })
        ));
        assert!(matches!(
            VertexLine::split("only-key"),
            Err(ParseError::MissingField { field: "vertexData" })
        ));
    }

    #[test]
    fn dictionary_lines() {
        let entry = DictionaryEntry::new(17, "ada");
        assert_eq!(entry.to_line(), "17\tada");
        assert_eq!(DictionaryEntry::parse("17\tada").unwrap(), entry);
        assert!(DictionaryEntry::parse("-1\tada").is_err());
        assert!(DictionaryEntry::parse("17\t").is_err());
    }

    #[test]
    fn classifier_counts_fields() {
        let c = ListRecordClassifier;
        assert!(c.is_vertex_record("a\t{}"));
        assert!(c.is_edge_record("a\tb\t{}"));
        assert!(!c.is_vertex_record("a\tb\t{}"));
    }
}

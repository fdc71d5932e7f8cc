//! Tab-separated graph records.
//!
//! ```text
//! V  <name>  [<label>]  [<props>]
//! E  <src>   <dst>      [<label>]  [<props>]
//! ```
//!
//! `-` stands for an absent label or property list. Properties are
//! `key=value` pairs joined by `,`; values are typed with
//! [`PropValue::parse_literal`]. A name written `#<digits>` is an integer
//! name. Edge endpoints are `label:name`, or a bare `name` for an unlabeled
//! vertex. Blank lines and lines starting with `#` carry no elements.

use grafter_model::{
    Edge, EdgeId, ParseError, PropValue, PropertyMap, RecordClassifier, Tokenizer, Tokens, Vertex,
    VertexId, VertexName,
};

const NONE: &str = "-";

#[derive(Debug, Clone, Copy, Default)]
pub struct TsvTokenizer;

impl Tokenizer for TsvTokenizer {
    fn name(&self) -> &'static str {
        "tsv"
    }

    fn tokenize(&self, record: &str) -> Result<Tokens, ParseError> {
        let mut tokens = Tokens::default();
        if is_blank(record) {
            return Ok(tokens);
        }
        let fields: Vec<&str> = record.trim_end_matches(['\r', '\n']).split('\t').collect();
        match fields.as_slice() {
            ["V", name, rest @ ..] => {
                if rest.len() > 2 {
                    return Err(too_many(record));
                }
                let label = optional(rest.first().copied());
                let name = parse_name(name)?;
                let id = match label {
                    Some(label) => VertexId::labeled(name, label),
                    None => VertexId::new(name),
                };
                let props = parse_props(rest.get(1).copied())?;
                tokens.vertices.push(Vertex::with_props(id, props));
            }
            ["E", src, dst, rest @ ..] => {
                if rest.len() > 2 {
                    return Err(too_many(record));
                }
                let label = optional(rest.first().copied()).unwrap_or_default();
                let id = EdgeId::new(parse_endpoint(src)?, parse_endpoint(dst)?, label);
                let props = parse_props(rest.get(1).copied())?;
                tokens.edges.push(Edge::with_props(id, props));
            }
            ["V"] | ["E"] | ["E", _] => {
                return Err(ParseError::Record(format!("truncated record: {record}")));
            }
            [kind, ..] => {
                return Err(ParseError::Record(format!("unknown record kind {kind:?}")));
            }
            [] => {}
        }
        Ok(tokens)
    }
}

/// Classifies records by their leading `V`/`E` field.
#[derive(Debug, Clone, Copy, Default)]
pub struct TsvClassifier;

impl RecordClassifier for TsvClassifier {
    fn is_vertex_record(&self, line: &str) -> bool {
        line.starts_with("V\t")
    }

    fn is_edge_record(&self, line: &str) -> bool {
        line.starts_with("E\t")
    }
}

fn is_blank(record: &str) -> bool {
    let trimmed = record.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

fn too_many(record: &str) -> ParseError {
    ParseError::Record(format!("too many fields: {record}"))
}

fn optional(field: Option<&str>) -> Option<&str> {
    field.filter(|f| !f.is_empty() && *f != NONE)
}

fn parse_name(text: &str) -> Result<VertexName, ParseError> {
    if text.is_empty() {
        return Err(ParseError::MissingField { field: "name" });
    }
    match text.strip_prefix('#') {
        Some(digits) => digits
            .parse::<i64>()
            .map(VertexName::Long)
            .map_err(|_| ParseError::InvalidNumber(text.to_string())),
        None => Ok(VertexName::Text(text.to_string())),
    }
}

fn parse_endpoint(text: &str) -> Result<VertexId, ParseError> {
    match text.split_once(':') {
        Some((label, name)) if !label.is_empty() => Ok(VertexId::labeled(parse_name(name)?, label)),
        Some((_, name)) => Ok(VertexId::new(parse_name(name)?)),
        None => Ok(VertexId::new(parse_name(text)?)),
    }
}

fn parse_props(field: Option<&str>) -> Result<PropertyMap, ParseError> {
    let mut props = PropertyMap::new();
    let Some(field) = optional(field) else {
        return Ok(props);
    };
    for pair in field.split(',').filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| ParseError::Record(format!("property without '=': {pair:?}")))?;
        if key.is_empty() {
            return Err(ParseError::MissingField { field: "property key" });
        }
        props.insert(key.to_string(), PropValue::parse_literal(value));
    }
    Ok(props)
}

#[cfg(test)]
mod tests {
    use super::*;
    use grafter_model::props;

    fn tokenize(line: &str) -> Tokens {
        TsvTokenizer.tokenize(line).unwrap()
    }

    #[test]
    fn vertex_with_label_and_props() {
        let tokens = tokenize("V\tada\tperson\tage=36,admin=true,score=9.5");
        assert_eq!(tokens.vertices.len(), 1);
        let v = &tokens.vertices[0];
        assert_eq!(v.id, VertexId::labeled("ada", "person"));
        assert_eq!(
            v.props,
            props([
                ("age", PropValue::Long(36)),
                ("admin", PropValue::Bool(true)),
                ("score", PropValue::Double(9.5)),
            ])
        );
    }

    #[test]
    fn bare_vertex_and_placeholders() {
        assert_eq!(tokenize("V\tx").vertices[0].id, VertexId::new("x"));
        let v = &tokenize("V\t#42\t-\t-").vertices[0];
        assert_eq!(v.id, VertexId::new(42i64));
        assert!(v.props.is_empty());
    }

    #[test]
    fn edge_endpoints_carry_labels() {
        let tokens = tokenize("E\tperson:ada\tcity:london\tlives_in\tsince=1843");
        let e = &tokens.edges[0];
        assert_eq!(e.id.src, VertexId::labeled("ada", "person"));
        assert_eq!(e.id.dst, VertexId::labeled("london", "city"));
        assert_eq!(e.id.label, "lives_in");
        assert_eq!(e.props["since"], PropValue::Long(1843));
    }

    #[test]
    fn edge_label_defaults_to_empty() {
        let e = &tokenize("E\ta\tb").edges[0];
        assert_eq!(e.id.label, "");
        assert_eq!(e.id.src, VertexId::new("a"));
    }

    #[test]
    fn comments_and_blanks_are_empty() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("# header").is_empty());
    }

    #[test]
    fn malformed_records_are_errors() {
        for bad in ["X\ta", "V", "E\ta", "V\ta\tl\tk=v\textra", "V\ta\t-\tnovalue", "V\t#x"] {
            assert!(TsvTokenizer.tokenize(bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn classifier_reads_the_kind_field() {
        assert!(TsvClassifier.is_vertex_record("V\ta"));
        assert!(TsvClassifier.is_edge_record("E\ta\tb"));
        assert!(!TsvClassifier.is_edge_record("V\ta"));
    }
}

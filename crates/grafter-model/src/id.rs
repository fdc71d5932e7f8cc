//! Vertex and edge identity.
//!
//! A [`VertexId`] is the grouping key for everything downstream: partition
//! buckets, dictionary shards and merge groups are all derived from its
//! canonical raw-id text, so that text must be a pure function of the value.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separates an escaped label from the escaped name in raw-id text.
pub const LABEL_SEPARATOR: char = '\u{1f}';

/// Raw-id text of the empty text name. Line formats reject empty keys.
const EMPTY_NAME: &str = "\\e";

// ============================================================================
// Vertex names
// ============================================================================

/// The opaque, comparable part of a vertex id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VertexName {
    Long(i64),
    Text(String),
}

impl VertexName {
    fn write_raw(&self, out: &mut String) {
        match self {
            VertexName::Long(n) => {
                out.push('#');
                out.push_str(&n.to_string());
            }
            VertexName::Text(s) if s.is_empty() => out.push_str(EMPTY_NAME),
            VertexName::Text(s) => {
                if s.starts_with('#') {
                    out.push('\\');
                }
                escape_into(s, out);
            }
        }
    }

    fn parse_raw(text: &str) -> Result<Self, ParseError> {
        if text == EMPTY_NAME {
            return Ok(VertexName::Text(String::new()));
        }
        if let Some(digits) = text.strip_prefix('#') {
            return digits
                .parse::<i64>()
                .map(VertexName::Long)
                .map_err(|_| ParseError::InvalidId(text.to_string()));
        }
        Ok(VertexName::Text(unescape(text)?))
    }
}

impl From<&str> for VertexName {
    fn from(value: &str) -> Self {
        VertexName::Text(value.to_string())
    }
}

impl From<String> for VertexName {
    fn from(value: String) -> Self {
        VertexName::Text(value)
    }
}

impl From<i64> for VertexName {
    fn from(value: i64) -> Self {
        VertexName::Long(value)
    }
}

impl fmt::Display for VertexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VertexName::Long(n) => write!(f, "{n}"),
            VertexName::Text(s) => f.write_str(s),
        }
    }
}

// ============================================================================
// Vertex ids
// ============================================================================

/// `(name, label)`; equality and hashing cover both fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VertexId {
    pub name: VertexName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl VertexId {
    pub fn new(name: impl Into<VertexName>) -> Self {
        Self {
            name: name.into(),
            label: None,
        }
    }

    pub fn labeled(name: impl Into<VertexName>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: Some(label.into()),
        }
    }

    /// Canonical raw-id text.
    ///
    /// Unlabeled ids render as the escaped name; labeled ids render as
    /// `label \u{1f} name`. Integer names are written `#<digits>` and the
    /// empty name is written `\e`, so the text is never empty. Tabs,
    /// newlines and the separator are backslash-escaped, so the result is safe
    /// inside a tab-separated line and [`VertexId::parse_raw`] inverts it.
    pub fn raw_id(&self) -> String {
        let mut out = String::new();
        if let Some(label) = &self.label {
            escape_into(label, &mut out);
            out.push(LABEL_SEPARATOR);
        }
        self.name.write_raw(&mut out);
        out
    }

    pub fn parse_raw(text: &str) -> Result<Self, ParseError> {
        if text.is_empty() {
            return Err(ParseError::InvalidId(String::new()));
        }
        match text.split_once(LABEL_SEPARATOR) {
            Some((label, name)) => Ok(Self {
                name: VertexName::parse_raw(name)?,
                label: Some(unescape(label)?),
            }),
            None => Ok(Self {
                name: VertexName::parse_raw(text)?,
                label: None,
            }),
        }
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{label}:{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

// ============================================================================
// Edge ids
// ============================================================================

/// `(src, dst, label)`. Property maps never take part in edge identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId {
    pub src: VertexId,
    pub dst: VertexId,
    pub label: String,
}

impl EdgeId {
    pub fn new(src: VertexId, dst: VertexId, label: impl Into<String>) -> Self {
        Self {
            src,
            dst,
            label: label.into(),
        }
    }

    pub fn is_self_loop(&self) -> bool {
        self.src == self.dst
    }

    /// The same edge with its endpoints swapped.
    pub fn reversed(&self) -> Self {
        Self {
            src: self.dst.clone(),
            dst: self.src.clone(),
            label: self.label.clone(),
        }
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})-[{}]->({})", self.src, self.label, self.dst)
    }
}

// ============================================================================
// Escaping
// ============================================================================

fn escape_into(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            LABEL_SEPARATOR => out.push_str("\\u"),
            other => out.push(other),
        }
    }
}

fn unescape(s: &str) -> Result<String, ParseError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('u') => out.push(LABEL_SEPARATOR),
            Some('#') => out.push('#'),
            _ => return Err(ParseError::InvalidId(s.to_string())),
        }
    }
    Ok(out)
}

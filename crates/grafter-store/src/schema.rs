//! Optional label schema.

use crate::PersistError;
use grafter_model::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Which labels the store accepts. `None` accepts any label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSchema {
    pub vertex_labels: Option<BTreeSet<String>>,
    pub edge_labels: Option<BTreeSet<String>>,
    /// Reject vertices committed without a label.
    pub require_vertex_label: bool,
}

impl StoreSchema {
    /// Accepts everything.
    pub fn open() -> Self {
        Self::default()
    }

    pub fn with_vertex_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vertex_labels = Some(labels.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_edge_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.edge_labels = Some(labels.into_iter().map(Into::into).collect());
        self
    }

    pub fn from_json_file(path: &Path) -> Result<Self, PersistError> {
        let text = std::fs::read_to_string(path).map_err(|source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|e| PersistError::Schema {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn check_vertex(&self, label: Option<&str>) -> Result<(), StoreError> {
        match (label, &self.vertex_labels) {
            (None, _) if self.require_vertex_label => Err(StoreError::SchemaViolation {
                label: String::new(),
                reason: "vertex has no label".to_string(),
            }),
            (Some(label), Some(allowed)) if !allowed.contains(label) => {
                Err(StoreError::SchemaViolation {
                    label: label.to_string(),
                    reason: "vertex label not in schema".to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    pub fn check_edge(&self, label: &str) -> Result<(), StoreError> {
        match &self.edge_labels {
            Some(allowed) if !allowed.contains(label) => Err(StoreError::SchemaViolation {
                label: label.to_string(),
                reason: "edge label not in schema".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_schema_accepts_everything() {
        let schema = StoreSchema::open();
        assert!(schema.check_vertex(None).is_ok());
        assert!(schema.check_vertex(Some("anything")).is_ok());
        assert!(schema.check_edge("any").is_ok());
    }

    #[test]
    fn closed_label_sets_reject_strangers() {
        let schema = StoreSchema::open()
            .with_vertex_labels(["person"])
            .with_edge_labels(["knows"]);
        assert!(schema.check_vertex(Some("person")).is_ok());
        assert!(schema.check_vertex(None).is_ok());
        assert!(matches!(
            schema.check_vertex(Some("city")),
            Err(StoreError::SchemaViolation { .. })
        ));
        assert!(schema.check_edge("likes").is_err());
    }

    #[test]
    fn unlabeled_vertices_can_be_required_away() {
        let schema = StoreSchema {
            require_vertex_label: true,
            ..StoreSchema::open()
        };
        assert!(schema.check_vertex(None).is_err());
    }

    #[test]
    fn schema_reads_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        std::fs::write(&path, r#"{"edge_labels": ["knows"]}"#).unwrap();
        let schema = StoreSchema::from_json_file(&path).unwrap();
        assert!(schema.vertex_labels.is_none());
        assert!(schema.check_edge("knows").is_ok());
    }
}

//! Text front ends for Grafter
//!
//! Turns raw text records into graph elements:
//! - `tsv`: one `V`/`E` record per line, tab-separated
//! - `jsonl`: one JSON object per line; a vertex may carry its outgoing links
//!
//! Formats are looked up by name in a [`TokenizerRegistry`] so the CLI and
//! config files can pick one without knowing the concrete types.

mod jsonl;
mod tsv;

pub use jsonl::{JsonlClassifier, JsonlTokenizer};
pub use tsv::{TsvClassifier, TsvTokenizer};

use grafter_model::Tokenizer;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("unknown record format '{name}' (known: {known})")]
    UnknownFormat { name: String, known: String },

    #[error("cannot infer a record format from {}", .0.display())]
    UndeterminedFormat(std::path::PathBuf),
}

type Constructor = fn() -> Arc<dyn Tokenizer>;

/// Maps format names to tokenizer constructors.
#[derive(Clone)]
pub struct TokenizerRegistry {
    constructors: BTreeMap<&'static str, Constructor>,
}

impl TokenizerRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("tsv", || Arc::new(TsvTokenizer));
        registry.register("jsonl", || Arc::new(JsonlTokenizer));
        registry
    }

    pub fn register(&mut self, name: &'static str, constructor: Constructor) {
        self.constructors.insert(name, constructor);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.constructors.keys().copied().collect()
    }

    pub fn create(&self, name: &str) -> Result<Arc<dyn Tokenizer>, IngestError> {
        self.constructors
            .get(name)
            .map(|ctor| ctor())
            .ok_or_else(|| IngestError::UnknownFormat {
                name: name.to_string(),
                known: self.names().join(", "),
            })
    }

    /// Tokenizer for a file, chosen by extension (`.tsv`, `.txt`, `.jsonl`,
    /// `.ndjson`). A directory is judged by its first data file.
    pub fn for_path(&self, path: &Path) -> Result<Arc<dyn Tokenizer>, IngestError> {
        let format = format_of(path).ok_or_else(|| IngestError::UndeterminedFormat(path.to_path_buf()))?;
        self.create(format)
    }
}

impl Default for TokenizerRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn format_of(path: &Path) -> Option<&'static str> {
    if path.is_dir() {
        let mut names: Vec<_> = std::fs::read_dir(path)
            .ok()?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        names.sort();
        return names.iter().find_map(|p| format_of(p));
    }
    match path.extension()?.to_str()? {
        "tsv" | "txt" => Some("tsv"),
        "jsonl" | "ndjson" => Some("jsonl"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_formats_resolve_by_name() {
        let registry = TokenizerRegistry::builtin();
        assert_eq!(registry.create("tsv").unwrap().name(), "tsv");
        assert_eq!(registry.create("jsonl").unwrap().name(), "jsonl");
        let err = registry.create("csv").err().unwrap();
        assert!(err.to_string().contains("jsonl, tsv"));
    }

    #[test]
    fn format_follows_extension() {
        let registry = TokenizerRegistry::builtin();
        assert_eq!(registry.for_path(Path::new("graph.ndjson")).unwrap().name(), "jsonl");
        assert_eq!(registry.for_path(Path::new("graph.tsv")).unwrap().name(), "tsv");
        assert!(matches!(
            registry.for_path(Path::new("graph.csv")),
            Err(IngestError::UndeterminedFormat(_))
        ));
    }
}

//! Subcommand implementations.

use crate::options::InputArgs;
use anyhow::{Context, Result};
use colored::Colorize;
use grafter_ingest_text::IngestError;
use grafter_model::DictionaryEntry;
use grafter_pipeline::pipeline::{EDGES_DIR, PART_PREFIX, VERTICES_DIR};
use grafter_pipeline::{io, ExitStatus, GraphLists, Pipeline, PipelineConfig, PipelineError, ShardKey};
use grafter_store::{MemoryGraph, PersistError, StoreSchema};
use std::path::Path;

/// Dictionary entries written by `hash-ids`.
pub const ENTRIES_DIR: &str = "entries";

/// Process exit code for a failed run.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(e) = err.downcast_ref::<PipelineError>() {
        return e.exit_code();
    }
    if err.downcast_ref::<IngestError>().is_some() {
        return ExitStatus::Config.code();
    }
    match err.downcast_ref::<PersistError>() {
        Some(PersistError::Schema { .. }) => ExitStatus::Config.code(),
        Some(_) => ExitStatus::Io.code(),
        None => ExitStatus::Unknown.code(),
    }
}

fn wrote(what: &str, count: u64, dir: &Path) {
    println!("  {} {count} {what} in {}", "→".cyan(), dir.display());
}

fn write_list(dir: &Path, lines: Vec<String>) -> Result<u64> {
    Ok(io::write_partitioned(dir, PART_PREFIX, &[lines])?)
}

pub fn build(config: PipelineConfig, input: &InputArgs, out: &Path, report: Option<&Path>) -> Result<()> {
    let tokenizer = input.tokenizer()?;
    let records = io::read_input(&input.input)?;
    let pipeline = Pipeline::new(config)?;

    println!(
        "{} {} ({} records, {})",
        "Building".green().bold(),
        input.input.display(),
        records.len(),
        tokenizer.name()
    );
    let run = pipeline.build_surrogate_graph(tokenizer.as_ref(), records, out)?;
    wrote("vertices", run.vertices, &out.join(VERTICES_DIR));
    wrote("edges", run.edges, &out.join(EDGES_DIR));
    println!(
        "  {} {} dictionary shards, {} entries",
        "→".cyan(),
        run.dictionary.shards,
        run.dictionary.entries
    );
    let misses = pipeline.counters().get(grafter_pipeline::counters::RESOLUTION_MISSES);
    if misses > 0 {
        println!("  {} {misses} edge records dropped (unresolved endpoint)", "→".yellow());
    }

    if let Some(path) = report {
        let json = serde_json::to_string_pretty(&run)?;
        std::fs::write(path, json).with_context(|| format!("writing report {}", path.display()))?;
        eprintln!("{} {}", "wrote".green().bold(), path.display().to_string().bold());
    }
    Ok(())
}

pub fn merge(config: PipelineConfig, input: &InputArgs, out: &Path) -> Result<()> {
    let tokenizer = input.tokenizer()?;
    let records = io::read_input(&input.input)?;
    let pipeline = Pipeline::new(config)?;

    let elements = pipeline.merge_records(tokenizer.as_ref(), records)?;
    let GraphLists { vertices, edges, .. } = GraphLists::from_elements(&elements);
    println!("{} {}", "Merged".green().bold(), input.input.display());
    let vertices_dir = out.join(VERTICES_DIR);
    let edges_dir = out.join(EDGES_DIR);
    wrote("vertices", write_list(&vertices_dir, vertices)?, &vertices_dir);
    wrote("edges", write_list(&edges_dir, edges)?, &edges_dir);
    Ok(())
}

pub fn hash_ids(config: PipelineConfig, vertices: &Path, out: &Path) -> Result<()> {
    let lines = io::read_input(vertices)?;
    let pipeline = Pipeline::new(config)?;
    let assigned = pipeline.assign_ids(&lines)?;

    println!("{} {} ids", "Assigned".green().bold(), assigned.len());
    let entries: Vec<String> = assigned.dictionary.iter().map(DictionaryEntry::to_line).collect();
    let vertices_dir = out.join(VERTICES_DIR);
    let entries_dir = out.join(ENTRIES_DIR);
    wrote("vertices", write_list(&vertices_dir, assigned.vertices)?, &vertices_dir);
    wrote("entries", write_list(&entries_dir, entries)?, &entries_dir);
    Ok(())
}

pub fn sort_dict(config: PipelineConfig, entries: &Path, out: &Path, key: ShardKey) -> Result<()> {
    let lines = io::read_input(entries)?;
    let pipeline = Pipeline::new(config)?;

    let mut parsed = Vec::with_capacity(lines.len());
    for line in &lines {
        match DictionaryEntry::parse(line) {
            Ok(entry) => parsed.push(entry),
            Err(e) => tracing::warn!(error = %e, line = %line, "skipping bad dictionary entry"),
        }
    }
    let manifest = pipeline.build_dictionary(parsed, out, key)?;
    println!(
        "{} {} entries into {} shards by {}",
        "Sharded".green().bold(),
        manifest.entries,
        manifest.shards,
        key.as_str()
    );
    Ok(())
}

pub fn join_edges(config: PipelineConfig, edges: &Path, dictionary: &Path, out: &Path) -> Result<()> {
    let lines = io::read_input(edges)?;
    let pipeline = Pipeline::new(config)?;
    let resolved = pipeline.join_edges(dictionary, lines)?;

    let counters = pipeline.counters();
    println!(
        "{} {} edges ({} misses, {} shard loads)",
        "Resolved".green().bold(),
        resolved.len(),
        counters.get(grafter_pipeline::counters::RESOLUTION_MISSES),
        counters.get(grafter_pipeline::counters::SHARD_LOADS)
    );
    wrote("edges", write_list(out, resolved)?, out);
    Ok(())
}

pub fn load(config: PipelineConfig, input: &InputArgs, snapshot: &Path, schema: Option<&Path>) -> Result<()> {
    let schema = match schema {
        Some(path) => StoreSchema::from_json_file(path)?,
        None => StoreSchema::open(),
    };
    let tokenizer = input.tokenizer()?;
    let records = io::read_input(&input.input)?;
    let pipeline = Pipeline::new(config)?;

    let graph = MemoryGraph::with_schema(schema);
    let report = pipeline.load_into_store(tokenizer.as_ref(), records, &graph.connector())?;
    graph.save(snapshot)?;

    println!(
        "{} {} vertices, {} edges in {} commits",
        "Loaded".green().bold(),
        report.vertices,
        report.edges,
        report.commits
    );
    eprintln!("{} {}", "wrote".green().bold(), snapshot.display().to_string().bold());
    Ok(())
}

pub fn lookup(config: PipelineConfig, dictionary: &Path, ids: Vec<u64>) -> Result<()> {
    let requested = ids.len();
    let pipeline = Pipeline::new(config)?;
    let entries = pipeline.lookup_raw_ids(dictionary, ids)?;
    for entry in &entries {
        println!("{}", entry.to_line());
    }
    let misses = pipeline.counters().get(grafter_pipeline::counters::RESOLUTION_MISSES);
    if misses > 0 {
        eprintln!(
            "{} {misses} of {requested} ids not found in {}",
            "info:".yellow().bold(),
            dictionary.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_the_error_kind() {
        let mismatch = anyhow::Error::from(PipelineError::ShardCountMismatch {
            dictionary: 4,
            partitions: 8,
        });
        assert_eq!(exit_code(&mismatch), 3);

        let unknown_format = anyhow::Error::from(IngestError::UnknownFormat {
            name: "csv".into(),
            known: "jsonl, tsv".into(),
        })
        .context("reading input");
        assert_eq!(exit_code(&unknown_format), 2);

        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 1);
    }

    #[test]
    fn write_list_creates_its_directory_and_refuses_reuse() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("list");
        let written = write_list(&out, vec!["a\t{}".into(), "b\t{}".into()]).unwrap();
        assert_eq!(written, 2);
        assert_eq!(io::read_input(&out).unwrap().len(), 2);

        let err = write_list(&out, vec!["c\t{}".into()]).unwrap_err();
        assert_eq!(exit_code(&err), ExitStatus::Config.code());
    }
}

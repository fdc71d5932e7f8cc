//! Part-file helpers for stage outputs.
//!
//! Every pass writes one file per partition, `<prefix>-r-<partition:05>`.
//! Files whose names start with `_` or `.` are metadata and are skipped when a
//! directory is read back as input.

use crate::error::{ConfigError, PipelineError, Result};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub fn part_file_name(prefix: &str, partition: usize) -> String {
    format!("{prefix}-r-{partition:05}")
}

/// Create `dir`, refusing to mix new part files with an earlier run's.
pub fn prepare_output_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;
    if !data_files(dir)?.is_empty() {
        return Err(ConfigError::OutputExists(dir.to_path_buf()).into());
    }
    Ok(())
}

pub fn write_lines<I, S>(path: &Path, lines: I) -> Result<u64>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let mut written = 0u64;
    for line in lines {
        writer
            .write_all(line.as_ref().as_bytes())
            .and_then(|_| writer.write_all(b"\n"))
            .map_err(|e| PipelineError::io(path, e))?;
        written += 1;
    }
    writer.flush().map_err(|e| PipelineError::io(path, e))?;
    Ok(written)
}

/// Write one part file per partition.
pub fn write_partitioned(dir: &Path, prefix: &str, partitions: &[Vec<String>]) -> Result<u64> {
    prepare_output_dir(dir)?;
    let mut total = 0;
    for (index, lines) in partitions.iter().enumerate() {
        total += write_lines(&dir.join(part_file_name(prefix, index)), lines)?;
    }
    Ok(total)
}

pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    BufReader::new(file)
        .lines()
        .map(|line| line.map_err(|e| PipelineError::io(path, e)))
        .filter(|line| !matches!(line, Ok(l) if l.is_empty()))
        .collect()
}

/// Data files directly under `dir`, sorted by name.
pub fn data_files(dir: &Path) -> Result<Vec<PathBuf>> {
    list_files(dir, |name| !name.starts_with('_') && !name.starts_with('.'))
}

/// Files under `dir` whose name starts with `prefix`, sorted by name.
pub fn files_with_prefix(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    list_files(dir, |name| name.starts_with(prefix))
}

fn list_files(dir: &Path, keep: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))? {
        let entry = entry.map_err(|e| PipelineError::io(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if keep(name) {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// All lines of a file, or of every data file when `path` is a directory.
pub fn read_input(path: &Path) -> Result<Vec<String>> {
    if path.is_dir() {
        let mut lines = Vec::new();
        for file in data_files(path)? {
            lines.extend(read_lines(&file)?);
        }
        Ok(lines)
    } else {
        read_lines(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitioned_output_round_trips_and_skips_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let parts = vec![vec!["a".to_string()], vec![], vec!["b".to_string(), "c".to_string()]];
        assert_eq!(write_partitioned(&out, "part", &parts).unwrap(), 3);
        fs::write(out.join("_SUCCESS"), "").unwrap();

        assert_eq!(data_files(&out).unwrap().len(), 3);
        assert_eq!(read_input(&out).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn existing_part_files_block_a_rerun() {
        let dir = tempfile::tempdir().unwrap();
        write_partitioned(dir.path(), "part", &[vec!["x".to_string()]]).unwrap();
        let err = prepare_output_dir(dir.path()).unwrap_err();
        assert!(matches!(err, PipelineError::Config(ConfigError::OutputExists(_))));
    }

    #[test]
    fn prefix_listing_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["shard1-r-00001", "shard10-r-00010", "shard2-r-00002"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        let found = files_with_prefix(dir.path(), "shard1-").unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("shard1-r-00001"));
    }
}

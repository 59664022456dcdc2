//! Per-iteration JSON-lines checkpoints of the full record set.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use tracing::info;

use crate::errors::{VoteTrackError, VoteTrackResult};
use crate::models::ResolvedRecord;

/// Checkpoint files for one table, one file per iteration.
#[derive(Clone, Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
    table_name: String,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>, table_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            table_name: table_name.into(),
        }
    }

    /// `<dir>/<table>-places-iteration-<NN>.jsonl`
    pub fn path(&self, iteration: u8) -> PathBuf {
        self.dir.join(format!(
            "{}-places-iteration-{:02}.jsonl",
            self.table_name, iteration
        ))
    }

    pub fn exists(&self, iteration: u8) -> bool {
        self.path(iteration).is_file()
    }

    /// Write every record, replacing any previous checkpoint for the same
    /// iteration. The file is written beside the target and renamed into
    /// place.
    pub fn write(&self, iteration: u8, records: &[ResolvedRecord]) -> VoteTrackResult<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(VoteTrackError::Io)?;
        let path = self.path(iteration);
        let partial = path.with_extension("jsonl.partial");
        {
            let mut out = BufWriter::new(File::create(&partial)?);
            for record in records {
                serde_json::to_writer(&mut out, record)?;
                out.write_all(b"\n")?;
            }
            out.flush()?;
        }
        std::fs::rename(&partial, &path)?;
        info!(iteration, rows = records.len(), path = %path.display(), "checkpoint written");
        Ok(path)
    }

    pub fn read(&self, iteration: u8) -> VoteTrackResult<Vec<ResolvedRecord>> {
        let path = self.path(iteration);
        if !path.is_file() {
            return Err(VoteTrackError::Checkpoint(format!(
                "no checkpoint for iteration {iteration:02} at {}",
                path.display()
            )));
        }
        let reader = BufReader::new(File::open(&path)?);
        let mut records = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: ResolvedRecord = serde_json::from_str(&line).map_err(|e| {
                VoteTrackError::Checkpoint(format!(
                    "{}:{}: {e}",
                    path.display(),
                    line_no + 1
                ))
            })?;
            records.push(record);
        }
        info!(iteration, rows = records.len(), path = %path.display(), "checkpoint read");
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Incremental, per-partition append of diffed records.
//!
//! For every partition present in the input the loader ensures the table,
//! fetches the persisted key snapshot, diffs, and appends the new rows in
//! bounded chunks. Each chunk commits or rolls back on its own. A chunk
//! failure ends that partition only; the remaining partitions still load.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::LoaderConfig;
use crate::errors::{VoteTrackError, VoteTrackResult};
use crate::load::diff::diff;
use crate::models::RecordBatch;
use crate::store::repository::{LoadRun, LoadStatus, PartitionRepository};

/// How rows map to partitions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Partitioning {
    /// Every row goes to one partition, e.g. the processing date.
    Fixed(String),
    /// Each row goes to the partition named by its value in this column.
    Column(String),
}

/// Group `batch` rows by partition key, in key order.
pub fn split_partitions(
    batch: RecordBatch,
    partitioning: &Partitioning,
) -> VoteTrackResult<BTreeMap<String, RecordBatch>> {
    let mut groups = BTreeMap::new();
    match partitioning {
        Partitioning::Fixed(key) => {
            if !batch.is_empty() {
                groups.insert(key.clone(), batch);
            }
        }
        Partitioning::Column(column) => {
            let idx = batch
                .column_index(column)
                .ok_or_else(|| VoteTrackError::MissingKeyColumn {
                    side: "batch",
                    column: column.clone(),
                })?;
            let columns = batch.columns().to_vec();
            for (n, row) in batch.into_rows().into_iter().enumerate() {
                let key = match row[idx].as_deref().map(str::trim) {
                    Some(k) if !k.is_empty() => k.to_string(),
                    _ => {
                        return Err(VoteTrackError::Schema(format!(
                            "row {n} has no value for partition column '{column}'"
                        )))
                    }
                };
                groups
                    .entry(key)
                    .or_insert_with(|| RecordBatch::new(columns.clone()))
                    .push(row)?;
            }
        }
    }
    Ok(groups)
}

/// Outcome of one [`IncrementalLoader::load`] call.
#[derive(Clone, Debug, Default, Serialize)]
pub struct LoadReport {
    pub partitions: Vec<LoadRun>,
}

impl LoadReport {
    pub fn attempted(&self) -> usize {
        self.partitions.iter().map(|p| p.attempted).sum()
    }

    pub fn committed(&self) -> usize {
        self.partitions.iter().map(|p| p.committed).sum()
    }

    /// `true` when no partition failed or stopped part way.
    pub fn is_complete(&self) -> bool {
        self.partitions
            .iter()
            .all(|p| matches!(p.status, LoadStatus::Loaded | LoadStatus::UpToDate))
    }

    pub fn partition(&self, key: &str) -> Option<&LoadRun> {
        self.partitions.iter().find(|p| p.partition_key == key)
    }
}

pub struct IncrementalLoader<R> {
    repository: R,
    key_columns: Vec<String>,
    chunk_size: usize,
}

impl<R: PartitionRepository> IncrementalLoader<R> {
    pub fn new(repository: R, key_columns: Vec<String>, config: &LoaderConfig) -> Self {
        Self {
            repository,
            key_columns,
            chunk_size: config.chunk_size.max(1),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Load every partition of `batch`.
    ///
    /// Configuration errors (missing key or partition columns, ragged rows,
    /// two partition keys sharing one table) abort the call before anything
    /// is written. Store errors are confined to the partition they hit and
    /// reported in its [`LoadRun`], as is a failure to record that run.
    pub fn load(&self, batch: RecordBatch, partitioning: &Partitioning) -> VoteTrackResult<LoadReport> {
        let groups = split_partitions(batch, partitioning)?;
        self.check_distinct_tables(groups.keys())?;
        info!(partitions = groups.len(), "load started");

        let mut report = LoadReport::default();
        for (key, rows) in &groups {
            let mut run = match self.load_partition(key, rows) {
                Ok(run) => run,
                Err(e) if e.is_configuration() => return Err(e),
                Err(e) => {
                    warn!(partition = %key, error = %e, "partition failed before append");
                    LoadRun {
                        partition_key: key.clone(),
                        table_name: self.repository.table_name(key),
                        attempted: 0,
                        committed: 0,
                        status: LoadStatus::Failed,
                        error: Some(e.to_string()),
                    }
                }
            };
            if let Err(e) = self.repository.record_load_run(&run) {
                warn!(partition = %key, error = %e, "could not record load run");
                let note = format!("load run not recorded: {e}");
                run.error = Some(match run.error.take() {
                    Some(prior) => format!("{prior}; {note}"),
                    None => note,
                });
            }
            report.partitions.push(run);
        }

        info!(
            attempted = report.attempted(),
            committed = report.committed(),
            complete = report.is_complete(),
            "load finished"
        );
        Ok(report)
    }

    /// Partition keys that differ only in punctuation or case map to the
    /// same table and would share its snapshot.
    fn check_distinct_tables<'k>(&self, keys: impl Iterator<Item = &'k String>) -> VoteTrackResult<()> {
        let mut owners: HashMap<String, &String> = HashMap::new();
        for key in keys {
            let table = self.repository.table_name(key);
            if let Some(other) = owners.insert(table.clone(), key) {
                return Err(VoteTrackError::Schema(format!(
                    "partition keys '{other}' and '{key}' both map to table {table}"
                )));
            }
        }
        Ok(())
    }

    /// Ensure, snapshot, diff, and append a single partition.
    pub fn load_partition(&self, partition_key: &str, batch: &RecordBatch) -> VoteTrackResult<LoadRun> {
        let table_name = self.repository.table_name(partition_key);
        let columns = batch.columns();
        if let Some(missing) = self.key_columns.iter().find(|k| !columns.contains(k)) {
            return Err(VoteTrackError::MissingKeyColumn {
                side: "batch",
                column: missing.clone(),
            });
        }
        self.repository
            .ensure_partition(partition_key, columns, &self.key_columns)?;
        let snapshot = self
            .repository
            .fetch_snapshot(partition_key, &self.key_columns)?;
        let new_rows = diff(batch, &snapshot, &self.key_columns)?;
        info!(
            partition = partition_key,
            table = %table_name,
            incoming = batch.len(),
            persisted = snapshot.len(),
            new = new_rows.len(),
            "partition diffed"
        );

        let attempted = new_rows.len();
        let mut committed = 0;
        let mut error = None;
        for (n, chunk) in new_rows.rows().chunks(self.chunk_size).enumerate() {
            match self.repository.append_chunk(partition_key, columns, chunk) {
                Ok(written) => {
                    committed += written;
                    debug!(partition = partition_key, chunk = n, rows = written, "chunk committed");
                }
                Err(e) => {
                    warn!(
                        partition = partition_key,
                        chunk = n,
                        rows = chunk.len(),
                        error = %e,
                        "chunk rolled back"
                    );
                    error = Some(e.to_string());
                    break;
                }
            }
        }

        let status = match (&error, attempted, committed) {
            (None, 0, _) => LoadStatus::UpToDate,
            (None, _, _) => LoadStatus::Loaded,
            (Some(_), _, 0) => LoadStatus::Failed,
            (Some(_), _, _) => LoadStatus::Partial,
        };
        Ok(LoadRun {
            partition_key: partition_key.to_string(),
            table_name,
            attempted,
            committed,
            status,
            error,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Partition-keyed repository contract consumed by the incremental loader.

use std::fmt;

use serde::Serialize;

use crate::errors::VoteTrackResult;
use crate::models::{RecordBatch, Row};

/// Final state of one partition's load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    /// Every diff row committed.
    Loaded,
    /// Nothing new relative to the snapshot.
    UpToDate,
    /// Some chunks committed before a chunk failed.
    Partial,
    /// No chunk committed.
    Failed,
}

impl LoadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loaded => "loaded",
            Self::UpToDate => "up_to_date",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "loaded" => Some(Self::Loaded),
            "up_to_date" => Some(Self::UpToDate),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of loading one partition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoadRun {
    pub partition_key: String,
    pub table_name: String,
    /// Diff rows the loader tried to append.
    pub attempted: usize,
    pub committed: usize,
    pub status: LoadStatus,
    pub error: Option<String>,
}

/// Storage for records split into independently loaded partitions. One
/// generic repository serves every partition; the partition is always an
/// explicit key.
pub trait PartitionRepository {
    /// Physical table backing `partition_key`.
    fn table_name(&self, partition_key: &str) -> String;

    /// Create the partition table when missing. Idempotent.
    fn ensure_partition(
        &self,
        partition_key: &str,
        columns: &[String],
        key_columns: &[String],
    ) -> VoteTrackResult<()>;

    /// Persisted rows of the partition, restricted to those of `columns`
    /// the table actually has.
    fn fetch_snapshot(&self, partition_key: &str, columns: &[String]) -> VoteTrackResult<RecordBatch>;

    /// Append `rows` in a single transaction: all commit or none do.
    /// Returns the number of rows written.
    fn append_chunk(
        &self,
        partition_key: &str,
        columns: &[String],
        rows: &[Row],
    ) -> VoteTrackResult<usize>;

    fn record_load_run(&self, run: &LoadRun) -> VoteTrackResult<()>;
}

impl<R: PartitionRepository + ?Sized> PartitionRepository for &R {
    fn table_name(&self, partition_key: &str) -> String {
        (**self).table_name(partition_key)
    }

    fn ensure_partition(
        &self,
        partition_key: &str,
        columns: &[String],
        key_columns: &[String],
    ) -> VoteTrackResult<()> {
        (**self).ensure_partition(partition_key, columns, key_columns)
    }

    fn fetch_snapshot(&self, partition_key: &str, columns: &[String]) -> VoteTrackResult<RecordBatch> {
        (**self).fetch_snapshot(partition_key, columns)
    }

    fn append_chunk(
        &self,
        partition_key: &str,
        columns: &[String],
        rows: &[Row],
    ) -> VoteTrackResult<usize> {
        (**self).append_chunk(partition_key, columns, rows)
    }

    fn record_load_run(&self, run: &LoadRun) -> VoteTrackResult<()> {
        (**self).record_load_run(run)
    }
}

//! Left-anti-join of a new batch against a persisted snapshot.

use std::collections::HashSet;

use tracing::debug;

use crate::errors::{VoteTrackError, VoteTrackResult};
use crate::models::RecordBatch;

fn key_indexes(
    batch: &RecordBatch,
    key_columns: &[String],
    side: &'static str,
) -> VoteTrackResult<Vec<usize>> {
    key_columns
        .iter()
        .map(|column| {
            batch
                .column_index(column)
                .ok_or_else(|| VoteTrackError::MissingKeyColumn {
                    side,
                    column: column.clone(),
                })
        })
        .collect()
}

/// Rows of `batch` whose key over `key_columns` is absent from `snapshot`.
///
/// Every key column must exist on both sides; a missing one is an error,
/// never a narrower key. Row order of `batch` is preserved.
pub fn diff(
    batch: &RecordBatch,
    snapshot: &RecordBatch,
    key_columns: &[String],
) -> VoteTrackResult<RecordBatch> {
    if key_columns.is_empty() {
        return Err(VoteTrackError::Config("diff needs at least one key column".into()));
    }
    let batch_keys = key_indexes(batch, key_columns, "batch")?;
    let snapshot_keys = key_indexes(snapshot, key_columns, "snapshot")?;

    let existing: HashSet<Vec<Option<&str>>> = snapshot
        .rows()
        .iter()
        .map(|row| snapshot_keys.iter().map(|&i| row[i].as_deref()).collect())
        .collect();

    let mut out = RecordBatch::new(batch.columns().to_vec());
    for row in batch.rows() {
        let key: Vec<Option<&str>> = batch_keys.iter().map(|&i| row[i].as_deref()).collect();
        if !existing.contains(&key) {
            out.push(row.clone())?;
        }
    }

    debug!(
        batch = batch.len(),
        snapshot = snapshot.len(),
        new = out.len(),
        "diff computed"
    );
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

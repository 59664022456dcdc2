//! SQLite-backed partition repository.
//!
//! Each public method opens its own connection so callers never manage
//! connection lifetime.

use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::errors::{VoteTrackError, VoteTrackResult};
use crate::models::{RecordBatch, Row};
use crate::store::repository::{LoadRun, LoadStatus, PartitionRepository};
use crate::store::schema::{self, quote_ident};

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    if raw == "~" || raw.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let mut expanded = PathBuf::from(home);
            if raw.len() > 2 {
                expanded.push(&raw[2..]);
            }
            return expanded;
        }
    }
    path.to_path_buf()
}

fn cell_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    }
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

pub struct Database {
    db_path: PathBuf,
    table_prefix: String,
}

impl Database {
    /// Resolve `db_path` (tilde and relative paths) and create its parent
    /// directory.
    pub fn new(db_path: impl AsRef<Path>, table_prefix: impl Into<String>) -> VoteTrackResult<Self> {
        let expanded = expand_tilde(db_path.as_ref());
        let resolved = if expanded.is_absolute() {
            expanded
        } else {
            std::env::current_dir()
                .map_err(VoteTrackError::Io)?
                .join(&expanded)
        };
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent).map_err(VoteTrackError::Io)?;
        }
        Ok(Self {
            db_path: resolved,
            table_prefix: table_prefix.into(),
        })
    }

    pub fn from_config(config: &StoreConfig) -> VoteTrackResult<Self> {
        Self::new(&config.db_path, config.table_prefix.clone())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> VoteTrackResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        Ok(conn)
    }

    /// Set WAL mode, create the bookkeeping tables, and stamp the schema
    /// version.
    pub fn init_schema(&self) -> VoteTrackResult<()> {
        let conn = self.connect()?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        for stmt in schema::SCHEMA_STATEMENTS {
            conn.execute_batch(stmt)?;
        }
        if schema::get_schema_version(&conn) < schema::SCHEMA_VERSION {
            schema::set_schema_version(&conn, schema::SCHEMA_VERSION)?;
        }
        Ok(())
    }

    pub fn table_exists(&self, table: &str) -> VoteTrackResult<bool> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1;",
            params![table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn table_columns(&self, table: &str) -> VoteTrackResult<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", quote_ident(table)))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    pub fn count_rows(&self, table: &str) -> VoteTrackResult<i64> {
        let conn = self.connect()?;
        let count = conn.query_row(
            &format!("SELECT COUNT(*) FROM {};", quote_ident(table)),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Recorded load runs, oldest first, optionally for one partition.
    pub fn load_runs(&self, partition_key: Option<&str>) -> VoteTrackResult<Vec<LoadRun>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT partition_key, table_name, attempted, committed, status, error_message \
             FROM load_runs \
             WHERE ?1 IS NULL OR partition_key = ?1 \
             ORDER BY id;",
        )?;
        let rows = stmt.query_map(params![partition_key], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut runs = Vec::new();
        for row in rows {
            let (partition_key, table_name, attempted, committed, status, error) = row?;
            let status = LoadStatus::parse(&status).ok_or_else(|| {
                VoteTrackError::Database(format!("unknown load status '{status}'"))
            })?;
            runs.push(LoadRun {
                partition_key,
                table_name,
                attempted: attempted as usize,
                committed: committed as usize,
                status,
                error,
            });
        }
        Ok(runs)
    }
}

impl PartitionRepository for Database {
    fn table_name(&self, partition_key: &str) -> String {
        schema::partition_table_name(&self.table_prefix, partition_key)
    }

    fn ensure_partition(
        &self,
        partition_key: &str,
        columns: &[String],
        key_columns: &[String],
    ) -> VoteTrackResult<()> {
        if columns.is_empty() {
            return Err(VoteTrackError::Schema(format!(
                "partition '{partition_key}' declares no columns"
            )));
        }
        let table = self.table_name(partition_key);
        let conn = self.connect()?;
        conn.execute_batch(&schema::create_partition_table_sql(&table, columns, key_columns))?;
        debug!(partition = partition_key, table = %table, "partition table ensured");
        Ok(())
    }

    fn fetch_snapshot(&self, partition_key: &str, columns: &[String]) -> VoteTrackResult<RecordBatch> {
        let table = self.table_name(partition_key);
        if !self.table_exists(&table)? {
            return Ok(RecordBatch::new(columns.to_vec()));
        }
        let present = self.table_columns(&table)?;
        let selected: Vec<String> = columns
            .iter()
            .filter(|c| present.contains(c))
            .cloned()
            .collect();
        if selected.is_empty() {
            return Ok(RecordBatch::new(selected));
        }

        let conn = self.connect()?;
        let names: Vec<String> = selected.iter().map(|c| quote_ident(c)).collect();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {};",
            names.join(", "),
            quote_ident(&table)
        ))?;
        let width = selected.len();
        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get_ref(i).map(cell_text))
                    .collect::<Result<Row, _>>()
            })?
            .collect::<Result<Vec<_>, _>>()?;

        info!(partition = partition_key, table = %table, rows = rows.len(), "snapshot fetched");
        RecordBatch::with_rows(selected, rows)
    }

    fn append_chunk(
        &self,
        partition_key: &str,
        columns: &[String],
        rows: &[Row],
    ) -> VoteTrackResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let table = self.table_name(partition_key);
        let mut conn = self.connect()?;
        // Dropping the transaction on an early return rolls it back.
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&schema::insert_sql(&table, columns))?;
            for row in rows {
                if row.len() != columns.len() {
                    return Err(VoteTrackError::Schema(format!(
                        "row has {} cells, table {table} expects {}",
                        row.len(),
                        columns.len()
                    )));
                }
                stmt.execute(rusqlite::params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn record_load_run(&self, run: &LoadRun) -> VoteTrackResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO load_runs(partition_key, table_name, attempted, committed, status, error_message) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                run.partition_key,
                run.table_name,
                run.attempted as i64,
                run.committed as i64,
                run.status.as_str(),
                run.error,
            ],
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

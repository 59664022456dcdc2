//! SQLite DDL for bookkeeping tables and per-partition record tables.

use std::sync::LazyLock;

use regex::Regex;
use rusqlite::Connection;

use crate::errors::VoteTrackResult;

/// Current schema version of the bookkeeping tables.
pub const SCHEMA_VERSION: i32 = 1;

/// Bookkeeping DDL, safe to replay on an initialised database.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS store_meta (
        key TEXT PRIMARY KEY,
        value TEXT
    );",
    "CREATE TABLE IF NOT EXISTS load_runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        partition_key TEXT NOT NULL,
        table_name TEXT NOT NULL,
        attempted INTEGER NOT NULL,
        committed INTEGER NOT NULL,
        status TEXT NOT NULL,
        error_message TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );",
    "CREATE INDEX IF NOT EXISTS idx_load_runs_partition ON load_runs(partition_key, created_at);",
];

/// Read the stored schema version; 0 when absent or unparseable.
pub fn get_schema_version(conn: &Connection) -> i32 {
    let result: Result<String, _> = conn.query_row(
        "SELECT value FROM store_meta WHERE key = 'schema_version';",
        [],
        |row| row.get(0),
    );
    match result {
        Ok(v) => v.parse::<i32>().unwrap_or(0),
        Err(_) => 0,
    }
}

pub fn set_schema_version(conn: &Connection, version: i32) -> VoteTrackResult<()> {
    conn.execute(
        "INSERT INTO store_meta(key, value) \
         VALUES('schema_version', ?1) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
        rusqlite::params![version.to_string()],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Partition tables
// ---------------------------------------------------------------------------

static NON_IDENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Table name for `partition_key` under `prefix`, e.g. `voters` and
/// `2024-05-21` give `voters_2024_05_21`. Keys differing only in case or
/// punctuation share a name; the loader rejects batches that mix them.
pub fn partition_table_name(prefix: &str, partition_key: &str) -> String {
    let raw = format!("{prefix}_{partition_key}").to_lowercase();
    NON_IDENT_RE
        .replace_all(&raw, "_")
        .trim_matches('_')
        .to_string()
}

/// Double-quote an SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `CREATE TABLE IF NOT EXISTS` for a partition table: one TEXT column per
/// declared column and a uniqueness constraint over the key columns.
pub fn create_partition_table_sql(table: &str, columns: &[String], key_columns: &[String]) -> String {
    let mut parts: Vec<String> = columns
        .iter()
        .map(|c| format!("{} TEXT", quote_ident(c)))
        .collect();
    if !key_columns.is_empty() {
        let keys: Vec<String> = key_columns.iter().map(|k| quote_ident(k)).collect();
        parts.push(format!("UNIQUE({})", keys.join(", ")));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({});",
        quote_ident(table),
        parts.join(", ")
    )
}

pub fn insert_sql(table: &str, columns: &[String]) -> String {
    let names: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let slots: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        quote_ident(table),
        names.join(", "),
        slots.join(", ")
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

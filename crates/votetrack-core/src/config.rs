//! Pipeline configuration.
//!
//! A single [`PipelineConfig`] value is built once by the host and passed
//! explicitly into every entry point (resolver, gateway, store, loader).
//!
//! ## Loading order
//!
//! 1. `VOTETRACK_CONFIG` environment variable (path to a TOML file)
//! 2. The explicit path handed to [`PipelineConfig::load`]
//! 3. Built-in defaults
//!
//! Environment overrides (`STATE`, `ES_HOST`, `ES_USERNAME`, `ES_PASSWORD`,
//! `CA_CERT_PATH`, `VOTETRACK_DB_PATH`) are applied on top of whichever
//! source won.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{info, warn};

use crate::errors::{VoteTrackError, VoteTrackResult};

/// Environment variable naming a TOML config file.
pub const CONFIG_ENV_VAR: &str = "VOTETRACK_CONFIG";

/// Rows per committed chunk when appending to a partition table.
pub const DEFAULT_CHUNK_SIZE: usize = 5000;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    pub ca_cert_path: Option<PathBuf>,
    /// Index holding one document per property.
    pub address_index: String,
    /// Index holding apartment/unit level documents.
    pub unit_index: String,
    /// Stable property identifier used to collapse component hits.
    pub collapse_field: String,
    pub timeout_secs: u64,
    /// Capacity of the query response cache. Zero disables caching.
    pub cache_entries: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            host: "https://localhost:9200".to_string(),
            username: "elastic".to_string(),
            password: String::new(),
            ca_cert_path: None,
            address_index: "places".to_string(),
            unit_index: "places-previous".to_string(),
            collapse_field: "[ATTOM ID]".to_string(),
            timeout_secs: 30,
            cache_entries: 4096,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub table_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("votetracker.db"),
            table_prefix: "voters".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Worker threads for row-level resolution. Zero means one per core.
    pub workers: usize,
    /// Unresolved rows handed to the worker pool at a time.
    pub batch_size: usize,
    /// Where per-pass checkpoints are written. `None` disables them.
    pub checkpoint_dir: Option<PathBuf>,
    /// Dataset name used in checkpoint file names.
    pub table_name: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            batch_size: 10_000,
            checkpoint_dir: None,
            table_name: "voterfile".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub chunk_size: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub state: String,
    /// Processing date of the extract being resolved and loaded.
    pub file_date: NaiveDate,
    /// Resolve and load only the first `sample` rows.
    pub sample: Option<usize>,
    pub search: SearchConfig,
    pub store: StoreConfig,
    pub resolver: ResolverConfig,
    pub loader: LoaderConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            state: "OREGON".to_string(),
            file_date: chrono::Local::now().date_naive(),
            sample: None,
            search: SearchConfig::default(),
            store: StoreConfig::default(),
            resolver: ResolverConfig::default(),
            loader: LoaderConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse a TOML document. Missing keys fall back to defaults.
    pub fn from_toml_str(contents: &str) -> VoteTrackResult<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> VoteTrackResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            VoteTrackError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Load using the standard search order, then apply environment
    /// overrides and validate.
    pub fn load(explicit: Option<&Path>) -> VoteTrackResult<Self> {
        let mut config = match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if Path::new(&path).exists() => {
                info!(path = %path, "Loading pipeline config from {CONFIG_ENV_VAR}");
                Self::load_from_file(Path::new(&path))?
            }
            Ok(path) => {
                warn!(path = %path, "{CONFIG_ENV_VAR} points at a missing file, ignoring");
                Self::load_explicit_or_default(explicit)?
            }
            Err(_) => Self::load_explicit_or_default(explicit)?,
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn load_explicit_or_default(explicit: Option<&Path>) -> VoteTrackResult<Self> {
        match explicit {
            Some(path) => {
                info!(path = %path.display(), "Loading pipeline config");
                Self::load_from_file(path)
            }
            None => {
                info!("No pipeline config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Apply environment-style overrides through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("STATE") {
            self.state = v;
        }
        if let Some(v) = lookup("ES_HOST") {
            self.search.host = v;
        }
        if let Some(v) = lookup("ES_USERNAME") {
            self.search.username = v;
        }
        if let Some(v) = lookup("ES_PASSWORD") {
            self.search.password = v;
        }
        if let Some(v) = lookup("CA_CERT_PATH") {
            self.search.ca_cert_path = if v.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(v))
            };
        }
        if let Some(v) = lookup("VOTETRACK_DB_PATH") {
            self.store.db_path = PathBuf::from(v);
        }
    }

    pub fn validate(&self) -> VoteTrackResult<()> {
        if self.loader.chunk_size == 0 {
            return Err(VoteTrackError::Config(
                "loader.chunk_size must be at least 1".into(),
            ));
        }
        if self.resolver.batch_size == 0 {
            return Err(VoteTrackError::Config(
                "resolver.batch_size must be at least 1".into(),
            ));
        }
        if self.search.host.trim().is_empty() {
            return Err(VoteTrackError::Config("search.host must not be empty".into()));
        }
        Ok(())
    }

    /// Lower-cased state name as stored in the `state` column.
    pub fn state_code(&self) -> String {
        self.state.to_lowercase()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config.state, "OREGON");
        assert_eq!(config.loader.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.search.address_index, "places");
        assert_eq!(config.search.unit_index, "places-previous");
        assert!(config.resolver.checkpoint_dir.is_none());
    }

    #[test]
    fn test_partial_toml_override() {
        let config = PipelineConfig::from_toml_str(
            r#"
state = "WASHINGTON"
file_date = "2024-05-21"

[loader]
chunk_size = 250

[search]
host = "https://search.internal:9200"
"#,
        )
        .unwrap();
        assert_eq!(config.state, "WASHINGTON");
        assert_eq!(config.state_code(), "washington");
        assert_eq!(config.file_date, NaiveDate::from_ymd_opt(2024, 5, 21).unwrap());
        assert_eq!(config.loader.chunk_size, 250);
        assert_eq!(config.search.host, "https://search.internal:9200");
        assert_eq!(config.search.username, "elastic");
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let err = PipelineConfig::from_toml_str("[loader]\nchunk_size = 0\n").unwrap_err();
        assert!(matches!(err, VoteTrackError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("STATE", "IDAHO"),
            ("ES_HOST", "https://es:9200"),
            ("ES_PASSWORD", "secret"),
            ("CA_CERT_PATH", ""),
            ("VOTETRACK_DB_PATH", "/tmp/votes.db"),
        ]
        .into_iter()
        .collect();
        let mut config = PipelineConfig::default();
        config.search.ca_cert_path = Some(PathBuf::from("/etc/ca.pem"));
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.state, "IDAHO");
        assert_eq!(config.search.host, "https://es:9200");
        assert_eq!(config.search.password, "secret");
        assert!(config.search.ca_cert_path.is_none());
        assert_eq!(config.store.db_path, PathBuf::from("/tmp/votes.db"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, "[resolver]\nworkers = 3\nbatch_size = 50\n").unwrap();
        let config = PipelineConfig::load_from_file(&path).unwrap();
        assert_eq!(config.resolver.workers, 3);
        assert_eq!(config.resolver.batch_size, 50);
    }
}

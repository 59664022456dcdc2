//! Error types for the votetrack core library.

/// Top-level error enum for the votetrack core library.
#[derive(Debug, thiserror::Error)]
pub enum VoteTrackError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Search gateway error: {0}")]
    Gateway(String),

    #[error("Config error: {0}")]
    Config(String),

    /// Row shape does not match the declared columns.
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// A declared diff key column is absent from one of the diff inputs.
    #[error("Key column '{column}' missing from {side}")]
    MissingKeyColumn { side: &'static str, column: String },

    #[error("Unknown resolver iteration: {0}")]
    UnknownPass(u8),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type VoteTrackResult<T> = Result<T, VoteTrackError>;

impl VoteTrackError {
    /// Errors caused by declared columns or settings rather than by the
    /// store or the network. Retrying cannot fix them.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Schema(_) | Self::MissingKeyColumn { .. } | Self::UnknownPass(_)
        )
    }
}

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("index directory error: {0}")]
    OpenDirectory(#[from] tantivy::directory::error::OpenDirectoryError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),

    #[error("unsupported query type '{0}'")]
    UnsupportedQueryType(String),

    #[error("invalid '{kind}' query: {reason}")]
    InvalidQuery { kind: String, reason: String },

    #[error("invalid event on line {line}: {source}")]
    InvalidEvent {
        line: usize,
        source: serde_json::Error,
    },

    #[error(
        "upsert of event {identity} failed and every write since the last \
         commit was discarded: {source}"
    )]
    UpsertRolledBack {
        identity: u64,
        source: tantivy::TantivyError,
    },

    #[error("index writer lock poisoned")]
    LockPoisoned,
}

impl Error {
    pub(crate) fn invalid_query(
        kind: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidQuery {
            kind: kind.to_string(),
            reason: reason.into(),
        }
    }
}

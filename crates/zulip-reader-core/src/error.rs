use std::path::PathBuf;

/// Errors produced by the feed engine's collaborators.
///
/// None of these ever reach the consumer callbacks: storage initialization
/// failure is fatal to the application shell, everything else is logged and
/// the current materialization is left untouched.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Failed to open message store at {path}: {source}")]
    StorageInit {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Zulip API error: {msg}")]
    Api { msg: String },

    #[error("Failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, FeedError>;

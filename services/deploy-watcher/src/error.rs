//! Error types for the deploy watcher

/// Errors that can occur in the deploy watcher
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Notifier error: {0}")]
    Notifier(String),

    #[error("Rollback error: {0}")]
    Rollback(String),
}

/// Result type alias for deploy watcher operations
pub type Result<T> = std::result::Result<T, WatcherError>;

//! Error types for the context engine.

use thiserror::Error;

/// Context engine error type.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Compaction became eligible but no summarizer was supplied.
    #[error("no summarizer configured; an eligible compaction step cannot run")]
    MissingSummarizer,
    /// The summarization strategy reported a failure.
    #[error("summarization failed: {0}")]
    Summarization(String),
    /// A stored row could not be decoded (corrupt id, role, or timestamp).
    #[error("invalid stored record: {0}")]
    InvalidRecord(String),
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// Completion error from the LLM summarizer.
    #[error("completion error: {0}")]
    Completion(#[from] rig::completion::CompletionError),
    /// HTTP client error from Rig.
    #[error("http client error: {0}")]
    HttpClient(#[from] rig::http_client::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias for context operations.
pub type ContextResult<T> = Result<T, ContextError>;

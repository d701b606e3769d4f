//! Error types for the tools module.

use thiserror::Error;

/// Errors that can occur during tool invocations.
#[derive(Debug, Error)]
pub enum ToolError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// Upstream returned a non-success status.
    #[error("Upstream returned status: {0}")]
    UpstreamStatus(String),

    /// HTML parsing error.
    #[error("HTML parsing error: {0}")]
    HtmlParse(String),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A required invocation parameter is missing.
    #[error("Missing '{0}' parameter")]
    MissingParameter(&'static str),

    /// Search returned no results.
    #[error("No results found for query: {0}")]
    NoResults(String),
}

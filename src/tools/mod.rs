//! External tools invocable by the chat layer.
//!
//! Tools are downstream collaborators: the context core never calls them.
//! A transport layer invokes a tool, then appends its result to the log as a
//! [`ChatRole::Tool`](crate::core::ChatRole::Tool) message like any other
//! turn. Each tool exposes a JSON function schema, a base context hint for
//! the model, and a JSON-parameterized invocation.

use std::future::Future;
use std::pin::Pin;

pub mod error;
pub mod web_search;

pub use error::ToolError;
pub use web_search::WebSearchTool;

/// Boxed future type for tool invocations.
pub type ToolFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An invocable external tool.
pub trait Tool: Send + Sync {
    /// Stable tool name used in function-call schemas.
    fn name(&self) -> &'static str;
    /// JSON function schema describing the tool and its parameters.
    fn schema(&self) -> serde_json::Value;
    /// Base context text telling the model when to use the tool.
    fn base_context(&self) -> &'static str;
    /// Invoke the tool with JSON parameters.
    ///
    /// # Errors
    /// Returns an error if parameters are missing or the invocation fails.
    fn invoke(
        &self,
        parameters: serde_json::Value,
    ) -> ToolFuture<'_, Result<serde_json::Value, ToolError>>;
}

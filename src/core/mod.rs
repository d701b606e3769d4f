//! Core context types and identifiers.

pub mod config;
pub mod errors;
pub mod ids;
pub mod message;
pub mod summary;

pub use config::{CompactionConfig, ContextConfig, HistoryConfig, LlmConfig, StorageConfig};
pub use errors::{ContextError, ContextResult};
pub use ids::{MessageId, SessionId, SessionIdError, SummaryId};
pub use message::{ChatMessage, ChatRole, ChatTurn};
pub use summary::{NewSummary, SummaryRecord};

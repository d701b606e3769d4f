//! Bounded conversational context for LLM chat agents.
//!
//! `tidemark` keeps a complete, durable, append-only log of every exchanged
//! message while exposing, on demand, a small fixed-size context window for a
//! model with a limited input budget. Older messages are never discarded:
//! they are progressively compacted into a hierarchy of summaries, so a model
//! still receives the gist of earlier conversation without the context
//! growing with the conversation.
//!
//! The crate is organized into:
//! - `core`: configuration, errors, identifiers, and the message/summary models
//! - `store`: `SQLite`-backed message log and summary tree
//! - `compaction`: the incremental, idempotent compaction engine
//! - `assemble`: bounded context assembly
//! - `summarization`: the summarizer strategy trait plus LLM and fallback impls
//! - `engine`: the orchestrating facade
//! - `tools`: external tools invocable by the chat layer (web search)
//! - `adapters`: tracing bootstrap

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod adapters;
pub mod assemble;
pub mod compaction;
pub mod core;
pub mod engine;
pub mod store;
pub mod summarization;
pub mod tools;

// Re-export commonly used types for convenience
pub use adapters::init_tracing;
pub use assemble::Assembler;
pub use compaction::{Compactor, PassReport};
pub use crate::core::{
    ChatMessage, ChatRole, ChatTurn, CompactionConfig, ContextConfig, ContextError, ContextResult,
    HistoryConfig, LlmConfig, MessageId, NewSummary, SessionId, SessionIdError, StorageConfig,
    SummaryId, SummaryRecord,
};
pub use engine::{ContextBackends, ContextEngine};
pub use store::{MessageLog, SqliteMessageLog, SqliteSummaryTree, SummaryTree};
pub use summarization::{ConcatSummarizer, LlmSummarizer, SummarizeFuture, Summarizer};
pub use tools::{Tool, ToolError, ToolFuture, WebSearchTool};

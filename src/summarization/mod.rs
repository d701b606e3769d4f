//! Summarization strategies for compaction.
//!
//! The compaction engine is handed a [`Summarizer`] at engine construction
//! and never talks to a model provider itself. [`LlmSummarizer`] is the
//! Ollama-backed implementation; [`ConcatSummarizer`] is a deterministic
//! non-LLM fallback.

pub mod llm_summarizer;
pub mod summarizer;

pub use llm_summarizer::LlmSummarizer;
pub use summarizer::{ConcatSummarizer, SummarizeFuture, Summarizer};

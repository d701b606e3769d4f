//! Summarizer strategy trait and the non-LLM fallback.

use std::future::Future;
use std::pin::Pin;

use crate::core::errors::ContextResult;
use crate::core::message::{ChatRole, ChatTurn};

/// Boxed future type for summarization calls.
pub type SummarizeFuture<'a> = Pin<Box<dyn Future<Output = ContextResult<String>> + Send + 'a>>;

/// Summarization strategy.
///
/// Receives ordered `{role, content}` turns — raw messages for a level-0
/// group, or lower-level summary texts wrapped as system turns for higher
/// levels — and produces one summary text. May fail; the engine performs no
/// internal retry, and a failed call is simply re-attempted verbatim by a
/// later compaction pass.
pub trait Summarizer: Send + Sync {
    /// Summarize the ordered turns into one text.
    ///
    /// # Errors
    /// Returns an error if summarization fails.
    fn summarize(&self, turns: Vec<ChatTurn>) -> SummarizeFuture<'_>;
}

/// Deterministic concatenation summarizer (no LLM).
///
/// Joins role-prefixed turns and truncates to a character budget. Useful
/// offline and as a degraded-mode strategy.
pub struct ConcatSummarizer {
    max_chars: usize,
}

impl ConcatSummarizer {
    /// Create a concatenation summarizer with the given output budget.
    #[must_use]
    pub const fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

impl Default for ConcatSummarizer {
    fn default() -> Self {
        Self::new(1200)
    }
}

impl Summarizer for ConcatSummarizer {
    fn summarize(&self, turns: Vec<ChatTurn>) -> SummarizeFuture<'_> {
        Box::pin(async move {
            let mut summary = String::new();
            for turn in &turns {
                summary.push_str(match turn.role {
                    ChatRole::User => "\nUser: ",
                    ChatRole::Assistant => "\nAssistant: ",
                    ChatRole::System => "\nSystem: ",
                    ChatRole::Tool => "\nTool: ",
                });
                summary.push_str(&turn.content);
            }

            Ok(truncate_to_chars(summary.trim_start(), self.max_chars))
        })
    }
}

/// Truncate a string to a maximum number of characters.
pub(crate) fn truncate_to_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

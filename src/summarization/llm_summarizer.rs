//! LLM-based summarization for conversation spans.
//!
//! Produces structured summaries of raw conversation groups and of
//! lower-level summary groups, through a local Ollama completion model.

use reqwest::Client as ReqwestClient;
use rig::client::CompletionClient;
use rig::completion::CompletionModel;
use rig::message::AssistantContent;
use rig::providers::ollama;
use tracing::debug;

use crate::core::config::LlmConfig;
use crate::core::errors::{ContextError, ContextResult};
use crate::core::message::{ChatRole, ChatTurn};
use crate::summarization::summarizer::{SummarizeFuture, Summarizer, truncate_to_chars};

/// System prompt for LLM summarization.
const SUMMARY_SYSTEM_PROMPT: &str = r"You are an assistant specialized in summarizing conversations.
Produce a structured, concise summary in English.

REQUIRED STRUCTURE:
## Key facts
- Important factual information about the user
- Identity, preferences, constraints mentioned

## Context
- Main topics discussed
- Decisions made or conclusions reached

## To remember
- Points that matter for future conversation
- Preferences or rules to respect

RULES:
- Maximum 400 words
- Be factual and precise
- Invent nothing; rely only on the provided turns
- The input may itself consist of earlier summaries; merge them into one
- Use bullet points for clarity";

/// LLM-based summarizer over an Ollama completion model.
pub struct LlmSummarizer {
    model: ollama::CompletionModel,
    temperature: f64,
    max_input_chars: usize,
    max_output_chars: usize,
}

impl LlmSummarizer {
    /// Create a new LLM summarizer.
    ///
    /// # Errors
    /// Returns an error if the Ollama client cannot be built.
    pub fn new(config: &LlmConfig, max_output_chars: usize) -> ContextResult<Self> {
        let builder = ollama::Client::<ReqwestClient>::builder().api_key(rig::client::Nothing);
        let builder = if let Some(base_url) = &config.base_url {
            builder.base_url(base_url)
        } else {
            builder
        };
        let client = builder.build().map_err(ContextError::from)?;
        let model = client.completion_model(config.model.clone());

        Ok(Self {
            model,
            temperature: config.temperature,
            max_input_chars: 8000,
            max_output_chars,
        })
    }
}

impl Summarizer for LlmSummarizer {
    fn summarize(&self, turns: Vec<ChatTurn>) -> SummarizeFuture<'_> {
        Box::pin(async move {
            if turns.is_empty() {
                return Ok(String::new());
            }

            let transcript = format_transcript(&turns, self.max_input_chars);
            let prompt = format!(
                "Summarize the following conversation span:\n\n{transcript}\n\nProduce a structured summary."
            );

            debug!("Summarizing {} turns with LLM", turns.len());

            let request = self
                .model
                .completion_request(prompt)
                .preamble(SUMMARY_SYSTEM_PROMPT.to_string())
                .temperature(self.temperature)
                .build();

            let response = self.model.completion(request).await?;
            let text = extract_text(&response.choice);
            Ok(truncate_to_chars(&text, self.max_output_chars))
        })
    }
}

/// Extract text from assistant response.
fn extract_text(choice: &rig::OneOrMany<AssistantContent>) -> String {
    let mut out = String::new();
    for content in choice.iter() {
        if let AssistantContent::Text(text) = content {
            out.push_str(&text.text);
        }
    }
    out
}

/// Format turns into a readable transcript string.
fn format_transcript(turns: &[ChatTurn], max_chars: usize) -> String {
    let mut output = String::new();
    let mut char_count = 0;

    for turn in turns {
        let role_str = match turn.role {
            ChatRole::User => "User",
            ChatRole::Assistant => "Assistant",
            ChatRole::System => "System",
            ChatRole::Tool => "Tool",
        };

        let line = format!("{}: {}\n", role_str, turn.content);
        let line_len = line.chars().count();

        if char_count + line_len > max_chars {
            // Truncate and add ellipsis
            let remaining = max_chars.saturating_sub(char_count).saturating_sub(3);
            let truncated: String = line.chars().take(remaining).collect();
            output.push_str(&truncated);
            output.push_str("...");
            break;
        }

        output.push_str(&line);
        char_count += line_len;
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_transcript_labels_roles() {
        let turns = vec![
            ChatTurn::new(ChatRole::User, "Hello"),
            ChatTurn::new(ChatRole::Assistant, "Hi there!"),
        ];

        let formatted = format_transcript(&turns, 1000);
        assert!(formatted.contains("User: Hello"));
        assert!(formatted.contains("Assistant: Hi there!"));
    }

    #[test]
    fn format_transcript_truncates_over_budget() {
        let turns = vec![
            ChatTurn::new(ChatRole::User, "This is a very long message"),
            ChatTurn::new(ChatRole::Assistant, "And another long response"),
        ];

        let formatted = format_transcript(&turns, 30);
        assert!(formatted.chars().count() <= 33); // 30 + "..."
        assert!(formatted.ends_with("..."));
    }

    #[test]
    fn format_transcript_handles_summary_input() {
        let turns = vec![
            ChatTurn::system("S1-5"),
            ChatTurn::system("S6-10"),
        ];

        let formatted = format_transcript(&turns, 1000);
        assert!(formatted.contains("System: S1-5"));
        assert!(formatted.contains("System: S6-10"));
    }
}

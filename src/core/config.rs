//! Configuration for the context engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::errors::{ContextError, ContextResult};

/// Top-level configuration for the context engine.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Storage settings.
    pub storage: StorageConfig,
    /// Raw-history window settings.
    pub history: HistoryConfig,
    /// Compaction settings.
    pub compaction: CompactionConfig,
    /// Completion model settings for the LLM summarizer.
    pub llm: LlmConfig,
}

impl ContextConfig {
    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ContextResult<()> {
        if self.history.max_history_messages == 0 {
            return Err(ContextError::InvalidConfig(
                "history.max_history_messages must be > 0".to_string(),
            ));
        }

        if self.compaction.group_size_level0 == 0 {
            return Err(ContextError::InvalidConfig(
                "compaction.group_size_level0 must be > 0".to_string(),
            ));
        }

        if self.compaction.group_size_higher_levels == 0 {
            return Err(ContextError::InvalidConfig(
                "compaction.group_size_higher_levels must be > 0".to_string(),
            ));
        }

        if let Some(base_url) = &self.llm.base_url {
            Url::parse(base_url)?;
        }

        Ok(())
    }
}

/// Storage configuration for the message log and summary tree.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
    /// Message log table name.
    pub messages_table: String,
    /// Summary tree table name.
    pub summaries_table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("context.sqlite"),
            messages_table: "chat_messages".to_string(),
            summaries_table: "chat_summaries".to_string(),
        }
    }
}

/// Raw-history window settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Number of most recent messages always returned raw.
    pub max_history_messages: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_history_messages: 20,
        }
    }
}

/// Compaction settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Messages per level-0 summary group.
    pub group_size_level0: usize,
    /// Lower-level summaries per higher-level summary group.
    pub group_size_higher_levels: usize,
    /// Highest summary level ever created.
    pub max_summary_level: u8,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            group_size_level0: 5,
            group_size_higher_levels: 5,
            max_summary_level: 3,
        }
    }
}

/// Completion model settings for the LLM summarizer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Ollama completion model name.
    pub model: String,
    /// Temperature for generation.
    pub temperature: f64,
    /// Optional max tokens.
    pub max_tokens: Option<u64>,
    /// Optional custom base URL.
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "ministral-3:8b-instruct-2512-q8_0".to_string(),
            temperature: 0.3,
            max_tokens: None,
            base_url: None,
        }
    }
}

//! Context engine orchestration.

use std::sync::Arc;

use tracing::{debug, info};

use crate::assemble::Assembler;
use crate::compaction::{Compactor, PassReport};
use crate::core::config::ContextConfig;
use crate::core::errors::ContextResult;
use crate::core::ids::{MessageId, SessionId};
use crate::core::message::{ChatMessage, ChatRole, ChatTurn};
use crate::store::{MessageLog, SqliteMessageLog, SqliteSummaryTree, SummaryTree};
use crate::summarization::Summarizer;

/// Backend dependencies for the context engine.
pub struct ContextBackends {
    /// Message log implementation.
    pub message_log: Arc<dyn MessageLog>,
    /// Summary tree implementation.
    pub summary_tree: Arc<dyn SummaryTree>,
}

impl ContextBackends {
    /// Build default `SQLite` backends from config.
    ///
    /// # Errors
    /// Returns an error if any backend cannot be initialized.
    pub async fn sqlite(config: &ContextConfig) -> ContextResult<Self> {
        let message_log = Arc::new(SqliteMessageLog::new(&config.storage).await?);
        let summary_tree = Arc::new(SqliteSummaryTree::new(&config.storage).await?);

        Ok(Self {
            message_log,
            summary_tree,
        })
    }
}

/// Bounded conversational context engine.
///
/// Owns the append-only message log, the summary tree, and the compaction
/// machinery. Calls for one session must be externally serialized
/// (single-writer assumption); the engine keeps no per-session in-memory
/// state, so every eligibility decision derives from committed rows.
pub struct ContextEngine {
    log: Arc<dyn MessageLog>,
    compactor: Compactor,
    assembler: Assembler,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl ContextEngine {
    /// Create a new context engine.
    ///
    /// The summarizer is optional here; the first *eligible* compaction step
    /// without one fails with
    /// [`ContextError::MissingSummarizer`](crate::core::ContextError::MissingSummarizer).
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ContextConfig, backends: ContextBackends) -> ContextResult<Self> {
        config.validate()?;
        let compactor = Compactor::new(
            &config,
            Arc::clone(&backends.message_log),
            Arc::clone(&backends.summary_tree),
        );
        let assembler = Assembler::new(
            &config,
            Arc::clone(&backends.message_log),
            Arc::clone(&backends.summary_tree),
        );

        Ok(Self {
            log: backends.message_log,
            compactor,
            assembler,
            summarizer: None,
        })
    }

    /// Create a new engine using `SQLite` backends.
    ///
    /// # Errors
    /// Returns an error if backends cannot be initialized.
    pub async fn from_config(config: ContextConfig) -> ContextResult<Self> {
        let backends = ContextBackends::sqlite(&config).await?;
        Self::new(config, backends)
    }

    /// Attach the summarization strategy.
    #[must_use]
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Append one message, then run one compaction pass.
    ///
    /// The message is durable before compaction starts. A compaction error
    /// (summarizer failure, missing summarizer, storage fault) propagates to
    /// the caller, but the message stays persisted and is never re-appended;
    /// the deferred compaction work is retried by later appends.
    ///
    /// # Errors
    /// Returns an error if persistence fails, or if the compaction pass
    /// fails after the message was stored.
    pub async fn append(
        &self,
        session_id: &SessionId,
        role: ChatRole,
        content: impl Into<String>,
    ) -> ContextResult<MessageId> {
        let id = self
            .log
            .append(session_id.clone(), role, content.into())
            .await?;
        debug!(session = %session_id, id = %id, %role, "Appended message");

        let report = self
            .compactor
            .run_pass(session_id, self.summarizer.as_deref())
            .await?;
        if report.advanced() {
            info!(
                session = %session_id,
                summaries = report.persisted.len(),
                "Compaction pass persisted new summaries"
            );
        }

        Ok(id)
    }

    /// Run one compaction pass without appending.
    ///
    /// Appends already compact incrementally; this is for draining backlog
    /// after a configuration change (e.g. a lowered tail window) without
    /// waiting for new traffic.
    ///
    /// # Errors
    /// Returns an error if storage access or summarization fails.
    pub async fn compact_once(&self, session_id: &SessionId) -> ContextResult<PassReport> {
        self.compactor
            .run_pass(session_id, self.summarizer.as_deref())
            .await
    }

    /// Assemble the bounded context for a session.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn assemble(
        &self,
        session_id: &SessionId,
        system_prompt: Option<&str>,
    ) -> ContextResult<Vec<ChatTurn>> {
        self.assembler.assemble(session_id, system_prompt).await
    }

    /// Load the last `limit` raw messages, oldest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn tail(
        &self,
        session_id: &SessionId,
        limit: u64,
    ) -> ContextResult<Vec<ChatMessage>> {
        self.log.tail(session_id.clone(), limit).await
    }

    /// Count messages in a session.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn count(&self, session_id: &SessionId) -> ContextResult<u64> {
        self.log.count(session_id.clone()).await
    }
}

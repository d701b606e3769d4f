//! Context assembly: system prompt + best-covering summary + raw tail.
//!
//! At most one summary is ever included: the single best-covering one
//! (highest level, then largest covered span) ending before the raw tail
//! window. If that summary is low-level and an earlier span has no single
//! covering summary yet, the earlier span is omitted — summaries are never
//! concatenated to achieve full coverage.

use std::sync::Arc;

use tracing::debug;

use crate::core::config::ContextConfig;
use crate::core::errors::ContextResult;
use crate::core::ids::{MessageId, SessionId};
use crate::core::message::{ChatMessage, ChatTurn};
use crate::store::{MessageLog, SummaryTree};

/// Context assembler over the two stores.
pub struct Assembler {
    log: Arc<dyn MessageLog>,
    tree: Arc<dyn SummaryTree>,
    max_history: u64,
}

impl Assembler {
    /// Create an assembler from validated configuration.
    pub fn new(
        config: &ContextConfig,
        log: Arc<dyn MessageLog>,
        tree: Arc<dyn SummaryTree>,
    ) -> Self {
        Self {
            log,
            tree,
            max_history: config.history.max_history_messages,
        }
    }

    /// Assemble the bounded context for a session.
    ///
    /// Returns, in order: the system prompt (if given), the best-covering
    /// summary as a system turn (only when history exceeds the tail window),
    /// then the raw tail, oldest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn assemble(
        &self,
        session_id: &SessionId,
        system_prompt: Option<&str>,
    ) -> ContextResult<Vec<ChatTurn>> {
        let total = self.log.count(session_id.clone()).await?;

        let mut context = Vec::new();
        if let Some(prompt) = system_prompt {
            context.push(ChatTurn::system(prompt));
        }

        if total <= self.max_history {
            let tail = self.log.tail(session_id.clone(), total).await?;
            context.extend(tail.iter().map(ChatMessage::turn));
            return Ok(context);
        }

        let tail = self.log.tail(session_id.clone(), self.max_history).await?;
        if let Some(first_kept) = tail.first() {
            let horizon = MessageId::new(first_kept.id.get().saturating_sub(1));
            if let Some(summary) = self
                .tree
                .best_covering(session_id.clone(), horizon)
                .await?
            {
                debug!(
                    session = %session_id,
                    level = summary.level,
                    end_ref = %summary.end_ref,
                    "Including best-covering summary"
                );
                context.push(ChatTurn::system(summary.text));
            }
        }
        context.extend(tail.iter().map(ChatMessage::turn));

        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::core::config::StorageConfig;
    use crate::core::ids::SummaryId;
    use crate::core::message::ChatRole;
    use crate::core::summary::NewSummary;
    use crate::store::{SqliteMessageLog, SqliteSummaryTree};

    struct Fixture {
        _dir: tempfile::TempDir,
        log: Arc<dyn MessageLog>,
        tree: Arc<dyn SummaryTree>,
        assembler: Assembler,
        session: SessionId,
    }

    async fn fixture() -> ContextResult<Fixture> {
        let dir = tempfile::tempdir()?;
        let storage = StorageConfig {
            sqlite_path: dir.path().join("context.sqlite"),
            ..StorageConfig::default()
        };
        let config = ContextConfig {
            storage: storage.clone(),
            ..ContextConfig::default()
        };
        let log: Arc<dyn MessageLog> = Arc::new(SqliteMessageLog::new(&storage).await?);
        let tree: Arc<dyn SummaryTree> = Arc::new(SqliteSummaryTree::new(&storage).await?);
        let assembler = Assembler::new(&config, Arc::clone(&log), Arc::clone(&tree));
        Ok(Fixture {
            _dir: dir,
            log,
            tree,
            assembler,
            session: SessionId::default(),
        })
    }

    async fn append_n(fixture: &Fixture, from: u64, to: u64) -> ContextResult<()> {
        for i in from..=to {
            fixture
                .log
                .append(fixture.session.clone(), ChatRole::User, format!("m{i}"))
                .await?;
        }
        Ok(())
    }

    async fn insert_span(
        fixture: &Fixture,
        level: u8,
        start: u64,
        end: u64,
    ) -> ContextResult<SummaryId> {
        fixture
            .tree
            .insert(NewSummary {
                session_id: fixture.session.clone(),
                level,
                start_ref: MessageId::new(start),
                end_ref: MessageId::new(end),
                text: format!("S{start}-{end}"),
            })
            .await
    }

    #[tokio::test]
    async fn short_history_returns_raw_messages_only() -> ContextResult<()> {
        let fixture = fixture().await?;
        append_n(&fixture, 1, 20).await?;
        insert_span(&fixture, 0, 1, 5).await?;

        let context = fixture
            .assembler
            .assemble(&fixture.session, Some("P"))
            .await?;
        assert_eq!(context.len(), 21);
        assert_eq!(context[0], ChatTurn::system("P"));
        assert_eq!(context[1].content, "m1");
        assert_eq!(context[20].content, "m20");
        Ok(())
    }

    #[tokio::test]
    async fn long_history_prepends_single_best_summary() -> ContextResult<()> {
        let fixture = fixture().await?;
        append_n(&fixture, 1, 26).await?;
        insert_span(&fixture, 0, 1, 5).await?;

        let context = fixture.assembler.assemble(&fixture.session, None).await?;
        // One summary, then exactly 20 raw messages 7..26.
        assert_eq!(context.len(), 21);
        assert_eq!(context[0], ChatTurn::system("S1-5"));
        assert_eq!(context[1].content, "m7");
        assert_eq!(context[20].content, "m26");
        Ok(())
    }

    #[tokio::test]
    async fn coverage_gap_before_best_summary_is_omitted() -> ContextResult<()> {
        let fixture = fixture().await?;
        append_n(&fixture, 1, 30).await?;
        insert_span(&fixture, 0, 1, 5).await?;
        insert_span(&fixture, 0, 6, 10).await?;

        // Horizon is message 10; the level-0 summary ending at 10 wins and
        // the span 1-5 simply drops out of the context.
        let context = fixture.assembler.assemble(&fixture.session, None).await?;
        assert_eq!(context[0], ChatTurn::system("S6-10"));
        assert!(!context.iter().any(|t| t.content == "S1-5"));
        Ok(())
    }

    #[tokio::test]
    async fn higher_level_summary_wins_at_same_horizon() -> ContextResult<()> {
        let fixture = fixture().await?;
        append_n(&fixture, 1, 30).await?;
        insert_span(&fixture, 0, 1, 5).await?;
        insert_span(&fixture, 0, 6, 10).await?;
        insert_span(&fixture, 1, 1, 10).await?;

        let context = fixture.assembler.assemble(&fixture.session, None).await?;
        assert_eq!(context[0], ChatTurn::system("S1-10"));
        Ok(())
    }

    #[tokio::test]
    async fn no_summary_is_included_when_none_covers_the_horizon() -> ContextResult<()> {
        let fixture = fixture().await?;
        append_n(&fixture, 1, 26).await?;

        let context = fixture.assembler.assemble(&fixture.session, None).await?;
        assert_eq!(context.len(), 20);
        assert_eq!(context[0].content, "m7");
        Ok(())
    }
}

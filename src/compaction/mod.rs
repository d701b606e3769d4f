//! Incremental compaction of the message log into the summary tree.
//!
//! One bounded pass runs after every append. The pass advances the tree by
//! at most one group per level, never an unbounded cascade:
//!
//! 1. **Level 0** — take the `group_size_level0` messages after the last
//!    covered id. The group must be *complete* (exactly that many messages)
//!    and *retirable* (its last id at or below `total - max_history_messages`,
//!    so no message still owed raw to the tail window is ever compacted).
//!    Summarize it and persist one level-0 summary.
//! 2. **Levels 1..=max** — take the `group_size_higher_levels` lower-level
//!    summaries past the last covered `end_ref`, ordered by `start_ref`.
//!    Summarize their texts (as system turns) into one summary spanning
//!    min(start_ref)..max(end_ref), then continue upward.
//!
//! Any ineligible step stops the whole pass. Every bound is recomputed from
//! committed rows, so re-running a pass after a crash or a failed summarizer
//! call either finds the group already summarized (no-op) or retries it
//! identically. A summarizer failure aborts the pass; summaries persisted
//! earlier in the same pass are kept.

use std::sync::Arc;

use tracing::{debug, info};

use crate::core::config::ContextConfig;
use crate::core::errors::{ContextError, ContextResult};
use crate::core::ids::{MessageId, SessionId, SummaryId};
use crate::core::message::{ChatMessage, ChatTurn};
use crate::core::summary::NewSummary;
use crate::store::{MessageLog, SummaryTree};
use crate::summarization::Summarizer;

/// Outcome of one compaction pass.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PassReport {
    /// Summaries persisted by this pass, as `(level, id)` in creation order.
    pub persisted: Vec<(u8, SummaryId)>,
}

impl PassReport {
    /// Whether the pass persisted anything.
    #[must_use]
    pub fn advanced(&self) -> bool {
        !self.persisted.is_empty()
    }
}

/// Compaction engine over the two stores.
pub struct Compactor {
    log: Arc<dyn MessageLog>,
    tree: Arc<dyn SummaryTree>,
    group_size_level0: usize,
    group_size_higher: usize,
    max_summary_level: u8,
    max_history: u64,
}

impl Compactor {
    /// Create a compaction engine from validated configuration.
    pub fn new(
        config: &ContextConfig,
        log: Arc<dyn MessageLog>,
        tree: Arc<dyn SummaryTree>,
    ) -> Self {
        Self {
            log,
            tree,
            group_size_level0: config.compaction.group_size_level0,
            group_size_higher: config.compaction.group_size_higher_levels,
            max_summary_level: config.compaction.max_summary_level,
            max_history: config.history.max_history_messages,
        }
    }

    /// Run one bounded compaction pass for a session.
    ///
    /// `summarizer` may be absent as long as nothing is eligible; the first
    /// step that actually needs it fails with
    /// [`ContextError::MissingSummarizer`].
    ///
    /// # Errors
    /// Returns an error if storage access or summarization fails, or if an
    /// eligible step finds no summarizer configured. Summaries persisted
    /// before the failure are kept.
    pub async fn run_pass(
        &self,
        session_id: &SessionId,
        summarizer: Option<&dyn Summarizer>,
    ) -> ContextResult<PassReport> {
        let mut report = PassReport::default();

        let Some(group) = self.eligible_level0_group(session_id).await? else {
            return Ok(report);
        };

        let summarizer = summarizer.ok_or(ContextError::MissingSummarizer)?;

        let id = self.summarize_level0(session_id, summarizer, &group).await?;
        report.persisted.push((0, id));

        for level in 1..=self.max_summary_level {
            match self.summarize_level(session_id, summarizer, level).await? {
                Some(id) => report.persisted.push((level, id)),
                None => break,
            }
        }

        Ok(report)
    }

    /// The next complete, retirable level-0 group, if any.
    async fn eligible_level0_group(
        &self,
        session_id: &SessionId,
    ) -> ContextResult<Option<Vec<ChatMessage>>> {
        let total = self.log.count(session_id.clone()).await?;
        let last_end = self
            .tree
            .last_end_ref(session_id.clone(), 0)
            .await?
            .unwrap_or(MessageId::ZERO);
        let group = self
            .log
            .page_after(session_id.clone(), last_end, self.group_size_level0)
            .await?;

        if group.len() < self.group_size_level0 {
            return Ok(None);
        }

        let last_id = group[group.len() - 1].id;
        let max_retirable = total.saturating_sub(self.max_history);
        if last_id.get() > max_retirable {
            // Complete group, but still inside the live tail window.
            debug!(
                session = %session_id,
                last_id = %last_id,
                max_retirable,
                "Level-0 group not yet retirable"
            );
            return Ok(None);
        }

        Ok(Some(group))
    }

    async fn summarize_level0(
        &self,
        session_id: &SessionId,
        summarizer: &dyn Summarizer,
        group: &[ChatMessage],
    ) -> ContextResult<SummaryId> {
        let turns: Vec<ChatTurn> = group.iter().map(ChatMessage::turn).collect();
        let text = summarizer.summarize(turns).await?;

        let start_ref = group[0].id;
        let end_ref = group[group.len() - 1].id;
        let id = self
            .tree
            .insert(NewSummary {
                session_id: session_id.clone(),
                level: 0,
                start_ref,
                end_ref,
                text,
            })
            .await?;

        info!(
            session = %session_id,
            start_ref = %start_ref,
            end_ref = %end_ref,
            "Persisted level-0 summary"
        );
        Ok(id)
    }

    /// Attempt one group at `level`; `None` means the level had no complete
    /// group and the pass must stop.
    async fn summarize_level(
        &self,
        session_id: &SessionId,
        summarizer: &dyn Summarizer,
        level: u8,
    ) -> ContextResult<Option<SummaryId>> {
        let last_end = self
            .tree
            .last_end_ref(session_id.clone(), level)
            .await?
            .unwrap_or(MessageId::ZERO);
        let group = self
            .tree
            .page_after(session_id.clone(), level - 1, last_end, self.group_size_higher)
            .await?;

        if group.len() < self.group_size_higher {
            return Ok(None);
        }

        let turns: Vec<ChatTurn> = group.iter().map(|s| ChatTurn::system(s.text.clone())).collect();
        let text = summarizer.summarize(turns).await?;

        let start_ref = group[0].start_ref;
        let end_ref = group[group.len() - 1].end_ref;
        let id = self
            .tree
            .insert(NewSummary {
                session_id: session_id.clone(),
                level,
                start_ref,
                end_ref,
                text,
            })
            .await?;

        info!(
            session = %session_id,
            level,
            start_ref = %start_ref,
            end_ref = %end_ref,
            "Persisted higher-level summary"
        );
        Ok(Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::core::config::StorageConfig;
    use crate::core::message::ChatRole;
    use crate::store::{SqliteMessageLog, SqliteSummaryTree};
    use crate::summarization::SummarizeFuture;

    /// Stub producing `S<first>-<last>` from the numbers embedded in the
    /// first and last turn contents.
    struct SpanSummarizer;

    impl Summarizer for SpanSummarizer {
        fn summarize(&self, turns: Vec<ChatTurn>) -> SummarizeFuture<'_> {
            Box::pin(async move {
                let first = turns
                    .first()
                    .and_then(|t| numbers(&t.content).into_iter().next())
                    .unwrap_or(0);
                let last = turns
                    .last()
                    .and_then(|t| numbers(&t.content).into_iter().last())
                    .unwrap_or(0);
                Ok(format!("S{first}-{last}"))
            })
        }
    }

    /// Stub failing on selected invocations, spanning otherwise.
    struct FlakySummarizer {
        calls: AtomicUsize,
        fail_on: usize,
    }

    impl FlakySummarizer {
        fn failing_on(call: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on: call,
            }
        }
    }

    impl Summarizer for FlakySummarizer {
        fn summarize(&self, turns: Vec<ChatTurn>) -> SummarizeFuture<'_> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Box::pin(async move {
                if call == self.fail_on {
                    return Err(ContextError::Summarization("stub outage".to_string()));
                }
                SpanSummarizer.summarize(turns).await
            })
        }
    }

    fn numbers(text: &str) -> Vec<u64> {
        let mut out = Vec::new();
        let mut current = None;
        for ch in text.chars() {
            if let Some(digit) = ch.to_digit(10) {
                current = Some(current.unwrap_or(0) * 10 + u64::from(digit));
            } else if let Some(value) = current.take() {
                out.push(value);
            }
        }
        if let Some(value) = current {
            out.push(value);
        }
        out
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        log: Arc<dyn MessageLog>,
        tree: Arc<dyn SummaryTree>,
        compactor: Compactor,
        session: SessionId,
    }

    async fn fixture(config: ContextConfig) -> ContextResult<Fixture> {
        let dir = tempfile::tempdir()?;
        let storage = StorageConfig {
            sqlite_path: dir.path().join("context.sqlite"),
            ..StorageConfig::default()
        };
        let log: Arc<dyn MessageLog> = Arc::new(SqliteMessageLog::new(&storage).await?);
        let tree: Arc<dyn SummaryTree> = Arc::new(SqliteSummaryTree::new(&storage).await?);
        let compactor = Compactor::new(&config, Arc::clone(&log), Arc::clone(&tree));
        Ok(Fixture {
            _dir: dir,
            log,
            tree,
            compactor,
            session: SessionId::default(),
        })
    }

    fn small_config() -> ContextConfig {
        let mut config = ContextConfig::default();
        config.compaction.group_size_level0 = 1;
        config.compaction.group_size_higher_levels = 2;
        config.compaction.max_summary_level = 2;
        config.history.max_history_messages = 1;
        config
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

    #[tokio::test]
    async fn complete_group_inside_tail_window_is_not_compacted() -> ContextResult<()> {
        let fixture = fixture(ContextConfig::default()).await?;
        // 24 messages: group 1-5 complete, but max_retirable = 4 < 5.
        append_n(&fixture, 1, 24).await?;

        let report = fixture
            .compactor
            .run_pass(&fixture.session, Some(&SpanSummarizer))
            .await?;
        assert!(!report.advanced());
        assert_eq!(fixture.tree.count(fixture.session.clone()).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn retirable_group_is_compacted_once() -> ContextResult<()> {
        let fixture = fixture(ContextConfig::default()).await?;
        // 25 messages: group 1-5, max_retirable = 5.
        append_n(&fixture, 1, 25).await?;

        let report = fixture
            .compactor
            .run_pass(&fixture.session, Some(&SpanSummarizer))
            .await?;
        assert_eq!(report.persisted.len(), 1);

        let best = fixture
            .tree
            .best_covering(fixture.session.clone(), MessageId::new(5))
            .await?
            .map(|s| (s.level, s.start_ref.get(), s.end_ref.get(), s.text));
        assert_eq!(best, Some((0, 1, 5, "S1-5".to_string())));

        // Idempotence: a second pass with no intervening append is a no-op.
        let report = fixture
            .compactor
            .run_pass(&fixture.session, Some(&SpanSummarizer))
            .await?;
        assert!(!report.advanced());
        assert_eq!(fixture.tree.count(fixture.session.clone()).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn missing_summarizer_surfaces_only_when_eligible() -> ContextResult<()> {
        let fixture = fixture(ContextConfig::default()).await?;

        // Nothing eligible yet: passes without a summarizer succeed.
        append_n(&fixture, 1, 24).await?;
        let report = fixture.compactor.run_pass(&fixture.session, None).await?;
        assert!(!report.advanced());

        // First eligible group: now the absence is a configuration error.
        append_n(&fixture, 25, 25).await?;
        let result = fixture.compactor.run_pass(&fixture.session, None).await;
        assert!(matches!(result, Err(ContextError::MissingSummarizer)));
        assert_eq!(fixture.tree.count(fixture.session.clone()).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn cascade_builds_levels_bottom_up() -> ContextResult<()> {
        let fixture = fixture(small_config()).await?;

        // group0=1, higher=2, max_level=2, history=1. Appending m1..m5 with a
        // pass after each one walks the cascade deterministically.
        let mut reports = Vec::new();
        for i in 1..=5 {
            append_n(&fixture, i, i).await?;
            reports.push(
                fixture
                    .compactor
                    .run_pass(&fixture.session, Some(&SpanSummarizer))
                    .await?,
            );
        }

        // Pass 2 summarizes m1; pass 3 summarizes m2 and folds (1,2) into
        // level 1; pass 5 folds (3,4) into level 1 and (1..4) into level 2.
        assert_eq!(reports[0].persisted.len(), 0);
        assert_eq!(reports[1].persisted.len(), 1);
        assert_eq!(reports[2].persisted.len(), 2);
        assert_eq!(reports[3].persisted.len(), 1);
        assert_eq!(reports[4].persisted.len(), 3);

        assert_eq!(fixture.tree.level_count(fixture.session.clone(), 0).await?, 4);
        assert_eq!(fixture.tree.level_count(fixture.session.clone(), 1).await?, 2);
        assert_eq!(fixture.tree.level_count(fixture.session.clone(), 2).await?, 1);

        let top = fixture
            .tree
            .best_covering(fixture.session.clone(), MessageId::new(4))
            .await?
            .map(|s| (s.level, s.start_ref.get(), s.end_ref.get(), s.text));
        assert_eq!(top, Some((2, 1, 4, "S1-4".to_string())));
        Ok(())
    }

    #[tokio::test]
    async fn no_level_beyond_max_is_ever_created() -> ContextResult<()> {
        let mut config = small_config();
        config.compaction.max_summary_level = 1;
        let fixture = fixture(config).await?;

        for i in 1..=9 {
            append_n(&fixture, i, i).await?;
            fixture
                .compactor
                .run_pass(&fixture.session, Some(&SpanSummarizer))
                .await?;
        }

        // Plenty of level-1 summaries exist; level 2 must still be empty.
        assert!(fixture.tree.level_count(fixture.session.clone(), 1).await? >= 2);
        assert_eq!(fixture.tree.level_count(fixture.session.clone(), 2).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn higher_level_failure_keeps_lower_level_progress() -> ContextResult<()> {
        let fixture = fixture(small_config()).await?;
        append_n(&fixture, 1, 2).await?;
        fixture
            .compactor
            .run_pass(&fixture.session, Some(&SpanSummarizer))
            .await?;

        // Next pass performs two summarizations (level 0 then level 1);
        // fail the second one.
        append_n(&fixture, 3, 3).await?;
        let flaky = FlakySummarizer::failing_on(2);
        let result = fixture.compactor.run_pass(&fixture.session, Some(&flaky)).await;
        assert!(matches!(result, Err(ContextError::Summarization(_))));

        // Partial progress: the level-0 summary of m2 survived the abort.
        assert_eq!(fixture.tree.level_count(fixture.session.clone(), 0).await?, 2);
        assert_eq!(fixture.tree.level_count(fixture.session.clone(), 1).await?, 0);

        // The next pass retries the deferred level-1 group identically.
        append_n(&fixture, 4, 4).await?;
        fixture
            .compactor
            .run_pass(&fixture.session, Some(&SpanSummarizer))
            .await?;
        let level1 = fixture
            .tree
            .page_after(fixture.session.clone(), 1, MessageId::ZERO, 10)
            .await?;
        assert_eq!(level1.len(), 1);
        assert_eq!(
            (level1[0].start_ref.get(), level1[0].end_ref.get()),
            (1, 2)
        );
        Ok(())
    }
}

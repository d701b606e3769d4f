//! Summary tree store for hierarchical compaction results.

use chrono::{TimeZone, Utc};
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use crate::core::config::StorageConfig;
use crate::core::errors::{ContextError, ContextResult};
use crate::core::ids::{MessageId, SessionId, SummaryId};
use crate::core::summary::{NewSummary, SummaryRecord};
use crate::store::StoreFuture;

/// Raw row shape shared by every summary query.
type SummaryRow = (i64, i64, i64, i64, String, i64);

/// Summary tree trait.
pub trait SummaryTree: Send + Sync {
    /// Persist one new summary and return its store-assigned id.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn insert(&self, summary: NewSummary) -> StoreFuture<'_, ContextResult<SummaryId>>;
    /// Largest `end_ref` at a level, if any summary exists there.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn last_end_ref(
        &self,
        session_id: SessionId,
        level: u8,
    ) -> StoreFuture<'_, ContextResult<Option<MessageId>>>;
    /// Up to `limit` summaries at `level` with `end_ref` strictly greater
    /// than `after`, ordered by `start_ref`. The compaction engine's
    /// higher-level group-selection read.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn page_after(
        &self,
        session_id: SessionId,
        level: u8,
        after: MessageId,
        limit: usize,
    ) -> StoreFuture<'_, ContextResult<Vec<SummaryRecord>>>;
    /// The single best summary covering history up to `max_end_ref`:
    /// `end_ref <= max_end_ref`, highest level first, then largest `end_ref`.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn best_covering(
        &self,
        session_id: SessionId,
        max_end_ref: MessageId,
    ) -> StoreFuture<'_, ContextResult<Option<SummaryRecord>>>;
    /// Count all summaries in a session.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn count(&self, session_id: SessionId) -> StoreFuture<'_, ContextResult<u64>>;
    /// Count summaries at one level of a session.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn level_count(
        &self,
        session_id: SessionId,
        level: u8,
    ) -> StoreFuture<'_, ContextResult<u64>>;
}

/// `SQLite` implementation of the summary tree.
pub struct SqliteSummaryTree {
    conn: Connection,
    table: String,
}

impl SqliteSummaryTree {
    /// Initialize the summary tree.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn new(config: &StorageConfig) -> ContextResult<Self> {
        let conn = Connection::open(&config.sqlite_path).await?;
        let table = config.summaries_table.clone();
        let table_name = table.clone();

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    session_id TEXT NOT NULL,
                    id INTEGER NOT NULL,
                    level INTEGER NOT NULL,
                    start_ref INTEGER NOT NULL,
                    end_ref INTEGER NOT NULL,
                    text TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    PRIMARY KEY (session_id, id)
                );
                CREATE INDEX IF NOT EXISTS idx_{table_name}_span
                    ON {table_name} (session_id, level, end_ref);"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }
}

impl SummaryTree for SqliteSummaryTree {
    fn insert(&self, summary: NewSummary) -> StoreFuture<'_, ContextResult<SummaryId>> {
        Box::pin(async move {
            let table = self.table.clone();
            let created_at = Utc::now().timestamp_millis();
            let assigned = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    let next: i64 = tx.query_row(
                        &format!(
                            "SELECT COALESCE(MAX(id), 0) + 1 FROM {table} WHERE session_id = ?1"
                        ),
                        rusqlite::params![summary.session_id],
                        |row| row.get(0),
                    )?;
                    tx.execute(
                        &format!(
                            "INSERT INTO {table}
                             (session_id, id, level, start_ref, end_ref, text, created_at)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                        ),
                        rusqlite::params![
                            summary.session_id,
                            next,
                            i64::from(summary.level),
                            summary.start_ref,
                            summary.end_ref,
                            summary.text,
                            created_at
                        ],
                    )?;
                    tx.commit()?;
                    Ok(next)
                })
                .await?;

            let assigned = u64::try_from(assigned)
                .map_err(|_| ContextError::InvalidRecord("negative summary id".to_string()))?;
            Ok(SummaryId::new(assigned))
        })
    }

    fn last_end_ref(
        &self,
        session_id: SessionId,
        level: u8,
    ) -> StoreFuture<'_, ContextResult<Option<MessageId>>> {
        Box::pin(async move {
            let table = self.table.clone();
            let last = self
                .conn
                .call(move |conn| {
                    let last: Option<i64> = conn.query_row(
                        &format!(
                            "SELECT MAX(end_ref) FROM {table}
                             WHERE session_id = ?1 AND level = ?2"
                        ),
                        rusqlite::params![session_id, i64::from(level)],
                        |row| row.get(0),
                    )?;
                    Ok(last)
                })
                .await?;

            match last {
                Some(value) => {
                    let value = u64::try_from(value).map_err(|_| {
                        ContextError::InvalidRecord("negative end_ref".to_string())
                    })?;
                    Ok(Some(MessageId::new(value)))
                }
                None => Ok(None),
            }
        })
    }

    fn page_after(
        &self,
        session_id: SessionId,
        level: u8,
        after: MessageId,
        limit: usize,
    ) -> StoreFuture<'_, ContextResult<Vec<SummaryRecord>>> {
        Box::pin(async move {
            let table = self.table.clone();
            let session = session_id.clone();
            let limit = i64::try_from(limit)
                .map_err(|_| ContextError::InvalidRecord("limit exceeds i64".to_string()))?;
            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT id, level, start_ref, end_ref, text, created_at
                         FROM {table}
                         WHERE session_id = ?1 AND level = ?2 AND end_ref > ?3
                         ORDER BY start_ref ASC
                         LIMIT ?4"
                    ))?;
                    let rows = stmt
                        .query_map(
                            rusqlite::params![session, i64::from(level), after, limit],
                            read_summary_row,
                        )?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;

            hydrate_summaries(&session_id, rows)
        })
    }

    fn best_covering(
        &self,
        session_id: SessionId,
        max_end_ref: MessageId,
    ) -> StoreFuture<'_, ContextResult<Option<SummaryRecord>>> {
        Box::pin(async move {
            let table = self.table.clone();
            let session = session_id.clone();
            let row = self
                .conn
                .call(move |conn| {
                    let row = conn
                        .query_row(
                            &format!(
                                "SELECT id, level, start_ref, end_ref, text, created_at
                                 FROM {table}
                                 WHERE session_id = ?1 AND end_ref <= ?2
                                 ORDER BY level DESC, end_ref DESC
                                 LIMIT 1"
                            ),
                            rusqlite::params![session, max_end_ref],
                            read_summary_row,
                        )
                        .optional()?;
                    Ok(row)
                })
                .await?;

            match row {
                Some(row) => {
                    let mut records = hydrate_summaries(&session_id, vec![row])?;
                    Ok(records.pop())
                }
                None => Ok(None),
            }
        })
    }

    fn count(&self, session_id: SessionId) -> StoreFuture<'_, ContextResult<u64>> {
        Box::pin(async move {
            let table = self.table.clone();
            let count = self
                .conn
                .call(move |conn| {
                    let count: i64 = conn.query_row(
                        &format!("SELECT COUNT(*) FROM {table} WHERE session_id = ?1"),
                        rusqlite::params![session_id],
                        |row| row.get(0),
                    )?;
                    Ok(count)
                })
                .await?;
            u64::try_from(count)
                .map_err(|_| ContextError::InvalidRecord("negative summary count".to_string()))
        })
    }

    fn level_count(
        &self,
        session_id: SessionId,
        level: u8,
    ) -> StoreFuture<'_, ContextResult<u64>> {
        Box::pin(async move {
            let table = self.table.clone();
            let count = self
                .conn
                .call(move |conn| {
                    let count: i64 = conn.query_row(
                        &format!(
                            "SELECT COUNT(*) FROM {table}
                             WHERE session_id = ?1 AND level = ?2"
                        ),
                        rusqlite::params![session_id, i64::from(level)],
                        |row| row.get(0),
                    )?;
                    Ok(count)
                })
                .await?;
            u64::try_from(count)
                .map_err(|_| ContextError::InvalidRecord("negative summary count".to_string()))
        })
    }
}

fn read_summary_row(row: &rusqlite::Row<'_>) -> Result<SummaryRow, rusqlite::Error> {
    let id: i64 = row.get(0)?;
    let level: i64 = row.get(1)?;
    let start_ref: i64 = row.get(2)?;
    let end_ref: i64 = row.get(3)?;
    let text: String = row.get(4)?;
    let created_at: i64 = row.get(5)?;
    Ok((id, level, start_ref, end_ref, text, created_at))
}

fn hydrate_summaries(
    session_id: &SessionId,
    rows: Vec<SummaryRow>,
) -> ContextResult<Vec<SummaryRecord>> {
    let mut records = Vec::with_capacity(rows.len());
    for (id, level, start_ref, end_ref, text, created_at) in rows {
        let id = u64::try_from(id)
            .map_err(|_| ContextError::InvalidRecord("negative summary id".to_string()))?;
        let level = u8::try_from(level)
            .map_err(|_| ContextError::InvalidRecord(format!("invalid level: {level}")))?;
        let start_ref = u64::try_from(start_ref)
            .map_err(|_| ContextError::InvalidRecord("negative start_ref".to_string()))?;
        let end_ref = u64::try_from(end_ref)
            .map_err(|_| ContextError::InvalidRecord("negative end_ref".to_string()))?;
        let created_at = Utc
            .timestamp_millis_opt(created_at)
            .single()
            .ok_or_else(|| ContextError::InvalidRecord("invalid timestamp".to_string()))?;
        records.push(SummaryRecord {
            id: SummaryId::new(id),
            session_id: session_id.clone(),
            level,
            start_ref: MessageId::new(start_ref),
            end_ref: MessageId::new(end_ref),
            text,
            created_at,
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &tempfile::TempDir) -> StorageConfig {
        StorageConfig {
            sqlite_path: dir.path().join("tree.sqlite"),
            ..StorageConfig::default()
        }
    }

    fn span(session: &SessionId, level: u8, start: u64, end: u64) -> NewSummary {
        NewSummary {
            session_id: session.clone(),
            level,
            start_ref: MessageId::new(start),
            end_ref: MessageId::new(end),
            text: format!("S{start}-{end}"),
        }
    }

    #[tokio::test]
    async fn insert_advances_last_end_ref() -> ContextResult<()> {
        let dir = tempfile::tempdir()?;
        let tree = SqliteSummaryTree::new(&test_config(&dir)).await?;
        let session = SessionId::default();

        assert_eq!(tree.last_end_ref(session.clone(), 0).await?, None);

        tree.insert(span(&session, 0, 1, 5)).await?;
        tree.insert(span(&session, 0, 6, 10)).await?;

        assert_eq!(
            tree.last_end_ref(session.clone(), 0).await?,
            Some(MessageId::new(10))
        );
        assert_eq!(tree.last_end_ref(session, 1).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn page_after_orders_by_start_ref() -> ContextResult<()> {
        let dir = tempfile::tempdir()?;
        let tree = SqliteSummaryTree::new(&test_config(&dir)).await?;
        let session = SessionId::default();

        for (start, end) in [(1, 5), (6, 10), (11, 15), (16, 20)] {
            tree.insert(span(&session, 0, start, end)).await?;
        }

        let page = tree
            .page_after(session, 0, MessageId::new(5), 2)
            .await?;
        let spans: Vec<(u64, u64)> = page
            .iter()
            .map(|s| (s.start_ref.get(), s.end_ref.get()))
            .collect();
        assert_eq!(spans, vec![(6, 10), (11, 15)]);
        Ok(())
    }

    #[tokio::test]
    async fn best_covering_prefers_higher_level_over_larger_span() -> ContextResult<()> {
        let dir = tempfile::tempdir()?;
        let tree = SqliteSummaryTree::new(&test_config(&dir)).await?;
        let session = SessionId::default();

        tree.insert(span(&session, 0, 1, 5)).await?;
        tree.insert(span(&session, 0, 6, 10)).await?;
        tree.insert(span(&session, 1, 1, 10)).await?;

        let best = tree
            .best_covering(session.clone(), MessageId::new(10))
            .await?
            .map(|s| (s.level, s.end_ref.get()));
        assert_eq!(best, Some((1, 10)));

        // Below the level-1 span only the first level-0 summary qualifies.
        let best = tree
            .best_covering(session.clone(), MessageId::new(9))
            .await?
            .map(|s| (s.level, s.end_ref.get()));
        assert_eq!(best, Some((0, 5)));

        assert!(tree.best_covering(session, MessageId::new(4)).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn counts_are_scoped_by_session_and_level() -> ContextResult<()> {
        let dir = tempfile::tempdir()?;
        let tree = SqliteSummaryTree::new(&test_config(&dir)).await?;
        let session = SessionId::default();
        let other: SessionId = "other".parse().expect("valid session id");

        tree.insert(span(&session, 0, 1, 5)).await?;
        tree.insert(span(&session, 1, 1, 5)).await?;
        tree.insert(span(&other, 0, 1, 5)).await?;

        assert_eq!(tree.count(session.clone()).await?, 2);
        assert_eq!(tree.level_count(session.clone(), 0).await?, 1);
        assert_eq!(tree.level_count(session, 1).await?, 1);
        assert_eq!(tree.count(other).await?, 1);
        Ok(())
    }
}

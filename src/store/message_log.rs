//! Append-only message log.

use std::str::FromStr;

use chrono::{TimeZone, Utc};
use tokio_rusqlite::Connection;

use crate::core::config::StorageConfig;
use crate::core::errors::{ContextError, ContextResult};
use crate::core::ids::{MessageId, SessionId};
use crate::core::message::{ChatMessage, ChatRole};
use crate::store::StoreFuture;

/// Raw row shape shared by every message query.
type MessageRow = (i64, String, String, i64);

/// Message log trait.
pub trait MessageLog: Send + Sync {
    /// Append one message and return its store-assigned id.
    ///
    /// Durable before returning; never affected by summary state.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn append(
        &self,
        session_id: SessionId,
        role: ChatRole,
        content: String,
    ) -> StoreFuture<'_, ContextResult<MessageId>>;
    /// Load the last `limit` messages, oldest first.
    ///
    /// A `limit` greater than the available count returns everything.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn tail(
        &self,
        session_id: SessionId,
        limit: u64,
    ) -> StoreFuture<'_, ContextResult<Vec<ChatMessage>>>;
    /// Count messages in a session.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn count(&self, session_id: SessionId) -> StoreFuture<'_, ContextResult<u64>>;
    /// Load up to `limit` messages with id strictly greater than `after`,
    /// in id order. The compaction engine's group-selection read.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn page_after(
        &self,
        session_id: SessionId,
        after: MessageId,
        limit: usize,
    ) -> StoreFuture<'_, ContextResult<Vec<ChatMessage>>>;
}

/// `SQLite` implementation of the message log.
pub struct SqliteMessageLog {
    conn: Connection,
    table: String,
}

impl SqliteMessageLog {
    /// Initialize the message log.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn new(config: &StorageConfig) -> ContextResult<Self> {
        let conn = Connection::open(&config.sqlite_path).await?;
        let table = config.messages_table.clone();
        let table_name = table.clone();

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    session_id TEXT NOT NULL,
                    id INTEGER NOT NULL,
                    role TEXT NOT NULL,
                    content TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    PRIMARY KEY (session_id, id)
                )"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }
}

impl MessageLog for SqliteMessageLog {
    fn append(
        &self,
        session_id: SessionId,
        role: ChatRole,
        content: String,
    ) -> StoreFuture<'_, ContextResult<MessageId>> {
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
                        rusqlite::params![session_id],
                        |row| row.get(0),
                    )?;
                    tx.execute(
                        &format!(
                            "INSERT INTO {table} (session_id, id, role, content, created_at)
                             VALUES (?1, ?2, ?3, ?4, ?5)"
                        ),
                        rusqlite::params![session_id, next, role.as_str(), content, created_at],
                    )?;
                    tx.commit()?;
                    Ok(next)
                })
                .await?;

            let assigned = u64::try_from(assigned)
                .map_err(|_| ContextError::InvalidRecord("negative message id".to_string()))?;
            Ok(MessageId::new(assigned))
        })
    }

    fn tail(
        &self,
        session_id: SessionId,
        limit: u64,
    ) -> StoreFuture<'_, ContextResult<Vec<ChatMessage>>> {
        Box::pin(async move {
            let table = self.table.clone();
            let session = session_id.clone();
            let limit = i64::try_from(limit)
                .map_err(|_| ContextError::InvalidRecord("limit exceeds i64".to_string()))?;
            let mut rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT id, role, content, created_at
                         FROM {table}
                         WHERE session_id = ?1
                         ORDER BY id DESC
                         LIMIT ?2"
                    ))?;
                    let rows = stmt
                        .query_map(rusqlite::params![session, limit], read_message_row)?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;

            rows.reverse();
            hydrate_messages(&session_id, rows)
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
                .map_err(|_| ContextError::InvalidRecord("negative message count".to_string()))
        })
    }

    fn page_after(
        &self,
        session_id: SessionId,
        after: MessageId,
        limit: usize,
    ) -> StoreFuture<'_, ContextResult<Vec<ChatMessage>>> {
        Box::pin(async move {
            let table = self.table.clone();
            let session = session_id.clone();
            let limit = i64::try_from(limit)
                .map_err(|_| ContextError::InvalidRecord("limit exceeds i64".to_string()))?;
            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT id, role, content, created_at
                         FROM {table}
                         WHERE session_id = ?1 AND id > ?2
                         ORDER BY id ASC
                         LIMIT ?3"
                    ))?;
                    let rows = stmt
                        .query_map(rusqlite::params![session, after, limit], read_message_row)?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;

            hydrate_messages(&session_id, rows)
        })
    }
}

fn read_message_row(row: &rusqlite::Row<'_>) -> Result<MessageRow, rusqlite::Error> {
    let id: i64 = row.get(0)?;
    let role: String = row.get(1)?;
    let content: String = row.get(2)?;
    let created_at: i64 = row.get(3)?;
    Ok((id, role, content, created_at))
}

fn hydrate_messages(
    session_id: &SessionId,
    rows: Vec<MessageRow>,
) -> ContextResult<Vec<ChatMessage>> {
    let mut messages = Vec::with_capacity(rows.len());
    for (id, role, content, created_at) in rows {
        let id = u64::try_from(id)
            .map_err(|_| ContextError::InvalidRecord("negative message id".to_string()))?;
        let role = ChatRole::from_str(&role)
            .map_err(|err| ContextError::InvalidRecord(format!("invalid role: {err}")))?;
        let created_at = Utc
            .timestamp_millis_opt(created_at)
            .single()
            .ok_or_else(|| ContextError::InvalidRecord("invalid timestamp".to_string()))?;
        messages.push(ChatMessage {
            id: MessageId::new(id),
            session_id: session_id.clone(),
            role,
            content,
            created_at,
        });
    }

    Ok(messages)
}

//! Summary model for the hierarchical compaction tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::ids::{MessageId, SessionId, SummaryId};

/// A persisted summary row.
///
/// `start_ref` and `end_ref` are always message ids: the inclusive bounds of
/// the raw run for a level-0 summary, and the min/max bounds of the
/// constituent lower-level summaries for level >= 1. Summaries are immutable
/// once written; higher levels subsume their span for retrieval without ever
/// updating or deleting them.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    /// Store-assigned id, per-session strictly increasing.
    pub id: SummaryId,
    /// Session this summary belongs to.
    pub session_id: SessionId,
    /// Compaction level, 0 for raw-message summaries.
    pub level: u8,
    /// First message id covered (inclusive).
    pub start_ref: MessageId,
    /// Last message id covered (inclusive).
    pub end_ref: MessageId,
    /// Summary text.
    pub text: String,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a new summary; the store assigns id and timestamp.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewSummary {
    /// Session the summary belongs to.
    pub session_id: SessionId,
    /// Compaction level.
    pub level: u8,
    /// First message id covered (inclusive).
    pub start_ref: MessageId,
    /// Last message id covered (inclusive).
    pub end_ref: MessageId,
    /// Summary text.
    pub text: String,
}

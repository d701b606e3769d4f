//! Durable stores: append-only message log and summary tree.
//!
//! Each store owns its own scoped `SQLite` connection handle, opened from
//! [`StorageConfig`](crate::core::StorageConfig) at construction and closed on
//! drop. There is no process-wide connection. Every write is a single atomic
//! transaction; reads recompute everything from committed rows.

use std::future::Future;
use std::pin::Pin;

pub mod message_log;
pub mod summary_tree;

/// Boxed future type for store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use message_log::{MessageLog, SqliteMessageLog};
pub use summary_tree::{SqliteSummaryTree, SummaryTree};

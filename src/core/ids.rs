//! Identifier types for the conversational context engine.
//!
//! This module is intentionally **type-heavy** and **logic-light**: strongly
//! typed newtypes for session keys and store-assigned row ids, plus their
//! parsing, formatting, and `SQLite` conversions.
//!
//! ## Session continuity
//! A [`SessionId`] is a stable, caller-supplied key (a chat id, a user handle,
//! `"default"`). Every message and summary is scoped to it; propagate the same
//! key across all calls that should share one conversation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ===== Session keys =========================================================

/// Errors returned when parsing/validating a [`SessionId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionIdError {
    /// Empty (or whitespace-only) key.
    Empty,
    /// Exceeds the maximum accepted length.
    TooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length received.
        got: usize,
    },
    /// Contains a disallowed character.
    InvalidChar {
        /// The invalid character.
        ch: char,
        /// The index where it was found.
        index: usize,
    },
}

impl fmt::Display for SessionIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "session id must not be empty"),
            Self::TooLong { max, got } => write!(f, "session id too long: got {got}, max {max}"),
            Self::InvalidChar { ch, index } => {
                write!(
                    f,
                    "session id contains invalid character {ch:?} at index {index}"
                )
            }
        }
    }
}

impl std::error::Error for SessionIdError {}

/// Stable key identifying one isolated conversation stream.
///
/// Examples:
/// - `default`
/// - `telegram:513412345`
/// - `workspace-7/thread-2`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Hard ceiling to prevent pathological keys.
    pub const MAX_LEN: usize = 128;

    /// Build a validated `SessionId`.
    ///
    /// Rules:
    /// - Non-empty after trimming.
    /// - Max length limited.
    /// - Conservative ASCII set: `[A-Za-z0-9._:/+-@]`.
    ///
    /// # Errors
    /// Returns `SessionIdError` if the input is empty, too long, or contains
    /// invalid characters.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, SessionIdError> {
        let s = raw.as_ref().trim();

        if s.is_empty() {
            return Err(SessionIdError::Empty);
        }
        if s.len() > Self::MAX_LEN {
            return Err(SessionIdError::TooLong {
                max: Self::MAX_LEN,
                got: s.len(),
            });
        }

        for (i, ch) in s.chars().enumerate() {
            let ok =
                ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | ':' | '/' | '-' | '+' | '@');
            if !ok {
                return Err(SessionIdError::InvalidChar { ch, index: i });
            }
        }

        Ok(Self(s.to_owned()))
    }

    /// Borrow as `&str`.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into `String`.
    #[inline]
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl Default for SessionId {
    /// The conventional single-conversation key.
    fn default() -> Self {
        Self("default".to_owned())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionId {
    type Err = SessionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<SessionId> for String {
    fn from(value: SessionId) -> Self {
        value.into_string()
    }
}

impl TryFrom<String> for SessionId {
    type Error = SessionIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

// ===== Row ids ==============================================================

/// Declare a store-assigned integer id newtype with a consistent API.
macro_rules! define_row_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(transparent)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// The zero sentinel: "nothing assigned yet" lower bound for
            /// range scans. Real ids start at 1.
            pub const ZERO: Self = Self(0);

            /// Wrap a raw id value.
            #[inline]
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Extract the raw id value.
            #[inline]
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            #[inline]
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u64 {
            #[inline]
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

define_row_id!(
    /// Identifier of one logged message.
    ///
    /// Assigned by the message log: per-session, strictly increasing, and
    /// contiguous from 1. Never reused.
    MessageId
);

define_row_id!(
    /// Identifier of one persisted summary row.
    ///
    /// Assigned by the summary tree: per-session, strictly increasing.
    SummaryId
);

// ===== Rusqlite integration ================================================

mod rusqlite_impl {
    use super::{MessageId, SessionId, SessionIdError, SummaryId};

    use rusqlite::types::{
        FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef,
    };

    impl ToSql for SessionId {
        fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
            Ok(ToSqlOutput::Owned(Value::Text(self.as_str().to_owned())))
        }
    }

    impl FromSql for SessionId {
        fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
            match value {
                ValueRef::Text(t) => {
                    let s = std::str::from_utf8(t).map_err(|e| FromSqlError::Other(Box::new(e)))?;
                    Self::new(s).map_err(|e| FromSqlError::Other(Box::new(e)))
                }
                ValueRef::Null => Err(FromSqlError::Other(Box::new(SessionIdError::Empty))),
                _ => Err(FromSqlError::InvalidType),
            }
        }
    }

    macro_rules! impl_rusqlite_row_id {
        ($t:ty) => {
            impl ToSql for $t {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    let value = i64::try_from(self.0)
                        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                    Ok(ToSqlOutput::Owned(Value::Integer(value)))
                }
            }

            impl FromSql for $t {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    match value {
                        ValueRef::Integer(i) => u64::try_from(i)
                            .map(Self)
                            .map_err(|e| FromSqlError::Other(Box::new(e))),
                        _ => Err(FromSqlError::InvalidType),
                    }
                }
            }
        };
    }

    impl_rusqlite_row_id!(MessageId);
    impl_rusqlite_row_id!(SummaryId);
}

//! Read-only allow-list for generated SQL.
//!
//! Parses generated SQL and admits only a single read-only query, so a
//! statement that would modify the store is rejected before any connection
//! is opened.

mod parser;

pub use parser::ReadOnlyGuard;

use std::fmt;
use thiserror::Error;

/// The type of SQL statement detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Explain,
    Insert,
    Update,
    Delete,
    Drop,
    Alter,
    Create,
    Pragma,
    Attach,
    Transaction,
    /// VACUUM, REINDEX or ANALYZE.
    Maintenance,
    /// Statement type could not be determined.
    Other,
}

impl StatementKind {
    /// Returns true for statements that never modify the store.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Select | Self::Explain)
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "SELECT"),
            Self::Explain => write!(f, "EXPLAIN"),
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::Drop => write!(f, "DROP"),
            Self::Alter => write!(f, "ALTER"),
            Self::Create => write!(f, "CREATE"),
            Self::Pragma => write!(f, "PRAGMA"),
            Self::Attach => write!(f, "ATTACH"),
            Self::Transaction => write!(f, "transaction control"),
            Self::Maintenance => write!(f, "maintenance"),
            Self::Other => write!(f, "unrecognized statement"),
        }
    }
}

/// A statement the guard lets through to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Parsed and classified as read-only.
    ReadOnly(StatementKind),
    /// Not understood by the parser and free of write keywords; carries the
    /// parser's reason. The store reports its own error if the text is invalid.
    Unparsed(String),
}

/// Why a statement was not admitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("no SQL statement found")]
    Empty,

    #[error("expected a single statement, found {0}")]
    MultipleStatements(usize),

    #[error("{0} statements are not allowed, only read-only queries")]
    NotReadOnly(StatementKind),
}

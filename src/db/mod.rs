//! Store abstraction layer for chinook-ask.
//!
//! Provides a trait-based interface over the relational store so the pipeline
//! can run against SQLite in production and an in-memory mock in tests.

mod mock;
pub mod provision;
mod schema;
mod sqlite;
mod types;

pub use mock::{ConnectionStats, MockStore};
pub use schema::{chinook_schema, Column, ForeignKey, Schema, SchemaDrift, Table};
pub use sqlite::SqliteStore;
pub use types::{ColumnInfo, QueryResult, Record, Row, Value};

use crate::error::{AskError, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

/// A queryable store that hands out short-lived connections.
///
/// Every call to [`QueryStore::open`] acquires a fresh connection; there is no
/// pooling and no reuse across calls.
#[async_trait]
pub trait QueryStore: Send + Sync {
    /// Opens a new connection to the store.
    async fn open(&self) -> Result<Box<dyn StoreConnection>>;

    /// Introspects the store's schema, returning table and relationship information.
    async fn introspect_schema(&self) -> Result<Schema>;
}

/// A single open connection to the store.
#[async_trait]
pub trait StoreConnection: Send {
    /// Executes a SQL statement and materializes every returned row.
    async fn execute_query(&mut self, sql: &str) -> Result<QueryResult>;

    /// Closes the connection.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Compares `expected` with the schema the store reports.
///
/// Drift is logged and returned. With `strict`, any drift or a failed
/// introspection is an error.
pub async fn verify_schema(
    store: &dyn QueryStore,
    expected: &Schema,
    strict: bool,
) -> Result<Vec<SchemaDrift>> {
    let actual = match store.introspect_schema().await {
        Ok(actual) => actual,
        Err(e) if strict => return Err(e),
        Err(e) => {
            warn!("Could not introspect store schema: {}", e);
            return Ok(Vec::new());
        }
    };

    let drift = expected.diff(&actual);
    if drift.is_empty() {
        debug!("Store schema matches the embedded description");
        return Ok(drift);
    }

    for item in &drift {
        warn!("Schema drift: {}", item);
    }

    if strict {
        return Err(AskError::store(format!(
            "Schema drift detected ({} difference(s)); refusing to start with --strict-schema",
            drift.len()
        )));
    }

    Ok(drift)
}

//! Mock store for testing.
//!
//! Provides an in-memory store with canned results and connection counters,
//! so tests can assert how many connections the pipeline opened and closed.

use super::{QueryResult, QueryStore, Schema, StoreConnection};
use crate::error::{AskError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared open/close counters for a [`MockStore`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    queries: Arc<AtomicUsize>,
}

impl ConnectionStats {
    /// Number of connections opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of connections closed so far.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of statements executed so far.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Connections opened but not yet closed.
    pub fn open_connections(&self) -> usize {
        self.opened().saturating_sub(self.closed())
    }
}

#[derive(Debug, Clone)]
enum MockResponse {
    Rows(QueryResult),
    Error(String),
}

/// A mock store that returns predefined results.
///
/// Responses are matched by case-insensitive substring against the executed SQL,
/// first match wins. Unmatched statements return an empty result.
#[derive(Debug, Clone, Default)]
pub struct MockStore {
    responses: Arc<Vec<(String, MockResponse)>>,
    schema: Schema,
    open_error: Option<String>,
    stats: ConnectionStats,
}

impl MockStore {
    /// Creates a new mock store with no canned responses and an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `result` for statements containing `pattern`.
    pub fn with_result(mut self, pattern: impl Into<String>, result: QueryResult) -> Self {
        Arc::make_mut(&mut self.responses).push((pattern.into(), MockResponse::Rows(result)));
        self
    }

    /// Fails statements containing `pattern` with the given store error text.
    pub fn with_error(mut self, pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.responses)
            .push((pattern.into(), MockResponse::Error(message.into())));
        self
    }

    /// Sets the schema reported by introspection.
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Makes every `open` call fail with the given message.
    pub fn failing_open(mut self, message: impl Into<String>) -> Self {
        self.open_error = Some(message.into());
        self
    }

    /// Returns a handle to the connection counters.
    pub fn stats(&self) -> ConnectionStats {
        self.stats.clone()
    }
}

#[async_trait]
impl QueryStore for MockStore {
    async fn open(&self) -> Result<Box<dyn StoreConnection>> {
        if let Some(message) = &self.open_error {
            return Err(AskError::store(message.clone()));
        }

        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            responses: Arc::clone(&self.responses),
            stats: self.stats.clone(),
        }))
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        Ok(self.schema.clone())
    }
}

struct MockConnection {
    responses: Arc<Vec<(String, MockResponse)>>,
    stats: ConnectionStats,
}

#[async_trait]
impl StoreConnection for MockConnection {
    async fn execute_query(&mut self, sql: &str) -> Result<QueryResult> {
        self.stats.queries.fetch_add(1, Ordering::SeqCst);
        let sql_lower = sql.to_lowercase();

        let response = self
            .responses
            .iter()
            .find(|(pattern, _)| sql_lower.contains(&pattern.to_lowercase()))
            .map(|(_, response)| response.clone());

        match response {
            Some(MockResponse::Rows(result)) => {
                Ok(result.with_execution_time(Duration::from_millis(1)))
            }
            Some(MockResponse::Error(message)) => Err(AskError::query(message)),
            None => Ok(QueryResult::new()),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

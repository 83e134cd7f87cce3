//! Query execution stage.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use super::{PipelineState, SessionState, Stage, StageOutcome, UserMessage};
use crate::db::provision::StoreProvisioner;
use crate::db::{QueryResult, QueryStore};
use crate::error::{AskError, Result};
use crate::safety::{Admission, ReadOnlyGuard};

/// Notice shown when the generator produced nothing to run.
pub const MISSING_SQL_MESSAGE: &str = "No SQL query found in session state.";

/// Runs `generated_sql` on a fresh store connection.
///
/// One connection per invocation, closed before the stage returns on every
/// path. Store errors clear the results and halt with the raw store text.
/// A store that cannot be provisioned aborts the run.
pub struct QueryExecutor {
    store: Arc<dyn QueryStore>,
    guard: Option<ReadOnlyGuard>,
    provisioner: Option<Arc<dyn StoreProvisioner>>,
}

impl QueryExecutor {
    /// Creates an executor. With `read_only`, statements are checked before execution.
    pub fn new(store: Arc<dyn QueryStore>, read_only: bool) -> Self {
        Self {
            store,
            guard: read_only.then(ReadOnlyGuard::new),
            provisioner: None,
        }
    }

    /// Checks the store file with `provisioner` before every execution.
    pub fn with_provisioner(mut self, provisioner: Arc<dyn StoreProvisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    /// Opens a connection, runs the statement, and closes the connection.
    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        let mut conn = self.store.open().await?;
        let result = conn.execute_query(sql).await;

        if let Err(e) = conn.close().await {
            tracing::warn!(error = %e, "Failed to close store connection");
        }

        result
    }
}

fn execution_error(mut state: SessionState, text: String) -> StageOutcome {
    state.clear_results();
    StageOutcome::Halt {
        state,
        message: UserMessage::ExecutionError(text),
        terminal: PipelineState::ExecutionError,
    }
}

#[async_trait]
impl Stage for QueryExecutor {
    fn name(&self) -> &'static str {
        "query_executor"
    }

    async fn run(&self, mut state: SessionState) -> StageOutcome {
        let sql = state
            .generated_sql()
            .map(str::trim)
            .filter(|sql| !sql.is_empty())
            .map(str::to_string);
        let Some(sql) = sql else {
            return StageOutcome::Halt {
                state,
                message: UserMessage::Notice(MISSING_SQL_MESSAGE.to_string()),
                terminal: PipelineState::SqlMissing,
            };
        };

        tracing::info!(sql = %sql, "Executing SQL query");

        if let Some(guard) = &self.guard {
            match guard.check(&sql) {
                Ok(Admission::ReadOnly(kind)) => tracing::debug!(%kind, "SQL admitted"),
                Ok(Admission::Unparsed(reason)) => {
                    tracing::debug!(%reason, "SQL not understood by the parser, passing to the store")
                }
                Err(rejection) => {
                    tracing::warn!(reason = %rejection, "Rejected generated SQL");
                    return execution_error(state, format!("Query rejected: {}", rejection));
                }
            }
        }

        if let Some(provisioner) = &self.provisioner {
            if let Err(e) = provisioner.ensure() {
                return StageOutcome::Fatal(e);
            }
        }

        let start = Instant::now();
        match self.execute(&sql).await {
            Ok(result) => {
                tracing::info!(
                    row_count = result.row_count,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Query executed successfully"
                );
                state.set_results(result);
                StageOutcome::Continue(state)
            }
            Err(e) => {
                tracing::error!(error = %e, "Query execution failed");
                execution_error(state, database_error_text(&e))
            }
        }
    }
}

fn database_error_text(error: &AskError) -> String {
    format!("Database error: {}", error.detail())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::provision::{FileProvisioner, Provisioned};
    use crate::db::{ColumnInfo, MockStore, Value};

    fn executor(store: &MockStore, read_only: bool) -> QueryExecutor {
        QueryExecutor::new(Arc::new(store.clone()), read_only)
    }

    fn with_sql(sql: &str) -> SessionState {
        let mut state = SessionState::new("question");
        state.set_generated_sql(sql);
        state
    }

    fn tracks() -> QueryResult {
        QueryResult::with_data(
            vec![ColumnInfo::new("Name", "TEXT"), ColumnInfo::new("Milliseconds", "INTEGER")],
            vec![
                vec![Value::from("For Those About To Rock"), Value::from(343719)],
                vec![Value::from("Balls to the Wall"), Value::from(342562)],
            ],
        )
    }

    #[tokio::test]
    async fn test_missing_sql_halts_without_connecting() {
        let store = MockStore::new();
        let outcome = executor(&store, true).run(SessionState::new("q")).await;

        match outcome {
            StageOutcome::Halt {
                message, terminal, ..
            } => {
                assert_eq!(terminal, PipelineState::SqlMissing);
                assert_eq!(message.text(), MISSING_SQL_MESSAGE);
            }
            other => panic!("expected halt, got {:?}", other),
        }
        assert_eq!(store.stats().opened(), 0);
    }

    #[tokio::test]
    async fn test_blank_sql_counts_as_missing() {
        let store = MockStore::new();
        let outcome = executor(&store, true).run(with_sql("   ")).await;

        assert!(matches!(
            outcome,
            StageOutcome::Halt {
                terminal: PipelineState::SqlMissing,
                ..
            }
        ));
        assert_eq!(store.stats().opened(), 0);
    }

    #[tokio::test]
    async fn test_rows_are_stored_in_both_forms() {
        let store = MockStore::new().with_result("from track", tracks());
        let outcome = executor(&store, true)
            .run(with_sql("SELECT Name, Milliseconds FROM Track LIMIT 2"))
            .await;

        let StageOutcome::Continue(state) = outcome else {
            panic!("expected continue");
        };
        assert_eq!(state.results().unwrap().row_count, 2);
        let records = state.query_results().unwrap();
        assert_eq!(records[0]["Milliseconds"], serde_json::json!(343719));
        assert_eq!(store.stats().opened(), 1);
        assert_eq!(store.stats().closed(), 1);
    }

    #[tokio::test]
    async fn test_empty_result_continues() {
        let store = MockStore::new();
        let outcome = executor(&store, true)
            .run(with_sql("SELECT Name FROM Artist WHERE 0"))
            .await;

        let StageOutcome::Continue(state) = outcome else {
            panic!("expected continue");
        };
        assert!(state.results().unwrap().is_empty());
        assert_eq!(state.query_results().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_store_error_closes_connection() {
        let store = MockStore::new().with_error("Nickname", "no such column: Nickname");
        let outcome = executor(&store, true)
            .run(with_sql("SELECT Nickname FROM Artist"))
            .await;

        match outcome {
            StageOutcome::Halt {
                state,
                message,
                terminal,
            } => {
                assert_eq!(terminal, PipelineState::ExecutionError);
                assert_eq!(message.text(), "Database error: no such column: Nickname");
                assert!(state.results().unwrap().is_empty());
            }
            other => panic!("expected halt, got {:?}", other),
        }
        assert_eq!(store.stats().opened(), 1);
        assert_eq!(store.stats().closed(), 1);
    }

    #[tokio::test]
    async fn test_open_failure_is_a_database_error() {
        let store = MockStore::new().failing_open("unable to open database file");
        let outcome = executor(&store, true).run(with_sql("SELECT 1")).await;

        let StageOutcome::Halt { message, .. } = outcome else {
            panic!("expected halt");
        };
        assert_eq!(
            message,
            UserMessage::ExecutionError("Database error: unable to open database file".to_string())
        );
    }

    #[tokio::test]
    async fn test_guard_rejects_before_connecting() {
        let store = MockStore::new();
        let outcome = executor(&store, true)
            .run(with_sql("DROP TABLE Artist"))
            .await;

        let StageOutcome::Halt { message, terminal, .. } = outcome else {
            panic!("expected halt");
        };
        assert_eq!(terminal, PipelineState::ExecutionError);
        assert_eq!(
            message.text(),
            "Query rejected: DROP statements are not allowed, only read-only queries"
        );
        assert_eq!(store.stats().opened(), 0);
    }

    #[tokio::test]
    async fn test_guard_disabled_passes_statement_to_store() {
        let store = MockStore::new().with_error("drop", "attempt to write a readonly database");
        let outcome = executor(&store, false)
            .run(with_sql("DROP TABLE Artist"))
            .await;

        let StageOutcome::Halt { message, .. } = outcome else {
            panic!("expected halt");
        };
        assert_eq!(
            message.text(),
            "Database error: attempt to write a readonly database"
        );
        assert_eq!(store.stats().closed(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_limit_offset_reaches_store() {
        let store = MockStore::new().with_result("limit 1, 2", tracks());
        let outcome = executor(&store, true)
            .run(with_sql("SELECT Name, Milliseconds FROM Track LIMIT 1, 2"))
            .await;

        let StageOutcome::Continue(state) = outcome else {
            panic!("expected continue");
        };
        assert_eq!(state.results().unwrap().row_count, 2);
        assert_eq!(store.stats().opened(), 1);
    }

    #[tokio::test]
    async fn test_glob_reaches_store() {
        let store = MockStore::new().with_result("glob", tracks());
        let outcome = executor(&store, true)
            .run(with_sql("SELECT Name, Milliseconds FROM Track WHERE Name GLOB 'B*'"))
            .await;

        assert!(matches!(outcome, StageOutcome::Continue(_)));
        assert_eq!(store.stats().closed(), 1);
    }

    #[tokio::test]
    async fn test_unparsed_text_fails_with_store_error() {
        let store = MockStore::new().with_error("here is", "near \"Here\": syntax error");
        let outcome = executor(&store, true)
            .run(with_sql("Here is the query you asked for"))
            .await;

        let StageOutcome::Halt { message, terminal, .. } = outcome else {
            panic!("expected halt");
        };
        assert_eq!(terminal, PipelineState::ExecutionError);
        assert_eq!(message.text(), "Database error: near \"Here\": syntax error");
    }

    struct CountingProvisioner {
        calls: std::sync::atomic::AtomicUsize,
    }

    impl StoreProvisioner for CountingProvisioner {
        fn ensure(&self) -> Result<Provisioned> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(Provisioned::AlreadyPresent)
        }
    }

    #[tokio::test]
    async fn test_provisioner_runs_before_every_execution() {
        let provisioner = Arc::new(CountingProvisioner {
            calls: Default::default(),
        });
        let store = MockStore::new().with_result("from track", tracks());
        let executor = executor(&store, true).with_provisioner(provisioner.clone());

        executor.run(with_sql("SELECT Name FROM Track")).await;
        executor.run(with_sql("SELECT Name FROM Track")).await;

        assert_eq!(provisioner.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(store.stats().opened(), 2);
    }

    #[tokio::test]
    async fn test_removed_store_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Chinook.db");
        std::fs::write(&path, b"chinook").unwrap();
        let store = MockStore::new();
        let executor = executor(&store, true)
            .with_provisioner(Arc::new(FileProvisioner::new(&path, None)));

        std::fs::remove_file(&path).unwrap();
        let outcome = executor.run(with_sql("SELECT Name FROM Artist")).await;

        let StageOutcome::Fatal(err) = outcome else {
            panic!("expected fatal outcome");
        };
        assert!(matches!(err, AskError::Provision(_)));
        assert_eq!(store.stats().opened(), 0);
    }
}

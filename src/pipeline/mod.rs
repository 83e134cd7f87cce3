//! Question answering pipeline.
//!
//! Four stages run in strict sequence over one [`SessionState`]:
//!
//! 1. [`SqlGenerator`] turns the question into SQL using the embedded schema.
//! 2. [`QueryExecutor`] runs the SQL on a fresh store connection.
//! 3. [`ResultFormatter`] renders the result as a fixed-width table.
//! 4. [`AnswerComposer`] explains the table in prose.
//!
//! Any stage may halt the run early. Every run ends in exactly one
//! [`PipelineState`] with exactly one [`UserMessage`], unless the store can no
//! longer be provisioned, which aborts the run with an error.

pub mod composer;
pub mod executor;
pub mod formatter;
pub mod generator;
pub mod session;

pub use composer::AnswerComposer;
pub use executor::QueryExecutor;
pub use formatter::{render_table, ResultFormatter};
pub use generator::SqlGenerator;
pub use session::{SessionState, StateKey};

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use tracing::Instrument;

use crate::db::provision::StoreProvisioner;
use crate::db::{QueryStore, Schema};
use crate::error::{AskError, Result};
use crate::llm::LlmClient;

/// Terminal state of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    /// No SQL was produced; nothing was executed.
    SqlMissing,
    /// The store reported an error, or the statement was rejected.
    ExecutionError,
    /// The query ran but returned no rows.
    HaltedNoResults,
    /// A grounded answer was composed.
    Answered,
    /// Results were formatted but the answer could not be composed.
    AnswerFailed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SqlMissing => "SQL_MISSING",
            Self::ExecutionError => "EXECUTION_ERROR",
            Self::HaltedNoResults => "HALTED_NO_RESULTS",
            Self::Answered => "ANSWERED",
            Self::AnswerFailed => "ANSWER_FAILED",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single message a run shows the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum UserMessage {
    /// The composed natural-language answer.
    Answer(String),
    /// The query returned nothing.
    NoResults(String),
    /// The store rejected or failed the query.
    ExecutionError(String),
    /// Any other notice (missing SQL, composition failure).
    Notice(String),
}

impl UserMessage {
    /// The text shown to the user.
    pub fn text(&self) -> &str {
        match self {
            Self::Answer(text)
            | Self::NoResults(text)
            | Self::ExecutionError(text)
            | Self::Notice(text) => text,
        }
    }
}

impl fmt::Display for UserMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// What a stage hands back to the orchestrator.
#[derive(Debug)]
pub enum StageOutcome {
    /// Proceed to the next stage with the updated state.
    Continue(SessionState),
    /// Stop the run and show `message`.
    Halt {
        state: SessionState,
        message: UserMessage,
        terminal: PipelineState,
    },
    /// Abort the run; the process cannot continue.
    Fatal(AskError),
}

/// One step of the pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage name used in logs.
    fn name(&self) -> &'static str;

    /// Runs the stage on the session state.
    async fn run(&self, state: SessionState) -> StageOutcome;
}

/// Behaviour switches for a pipeline.
#[derive(Clone)]
pub struct PipelineOptions {
    /// Reject anything but a single read-only query before execution.
    pub read_only: bool,
    /// Checked before every execution; failure aborts the run.
    pub provisioner: Option<Arc<dyn StoreProvisioner>>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            read_only: true,
            provisioner: None,
        }
    }
}

impl fmt::Debug for PipelineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineOptions")
            .field("read_only", &self.read_only)
            .field("provisioner", &self.provisioner.is_some())
            .finish()
    }
}

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub state: PipelineState,
    pub message: UserMessage,
    pub session: SessionState,
}

/// Orchestrates the four stages for each question.
///
/// A pipeline holds no per-session data, so one instance can answer many
/// questions concurrently.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// Builds the standard four-stage pipeline.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        store: Arc<dyn QueryStore>,
        schema: &Schema,
        options: PipelineOptions,
    ) -> Self {
        let mut executor = QueryExecutor::new(store, options.read_only);
        if let Some(provisioner) = options.provisioner {
            executor = executor.with_provisioner(provisioner);
        }

        Self::with_stages(vec![
            Box::new(SqlGenerator::new(Arc::clone(&llm), schema)),
            Box::new(executor),
            Box::new(ResultFormatter::new()),
            Box::new(AnswerComposer::new(llm)),
        ])
    }

    /// Builds a pipeline from explicit stages.
    pub fn with_stages(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// Answers one question in a fresh session.
    ///
    /// Every per-session failure is reported through the outcome's message.
    /// An error is returned only when a stage reports a fatal condition.
    pub async fn answer(&self, question: &str) -> Result<PipelineOutcome> {
        let span = tracing::info_span!("session", question_len = question.len());
        self.run_stages(SessionState::new(question))
            .instrument(span)
            .await
    }

    async fn run_stages(&self, mut state: SessionState) -> Result<PipelineOutcome> {
        let start = Instant::now();

        for stage in &self.stages {
            let stage_start = Instant::now();
            match stage.run(state).await {
                StageOutcome::Continue(next) => {
                    tracing::debug!(
                        stage = stage.name(),
                        duration_ms = stage_start.elapsed().as_millis() as u64,
                        "Stage completed"
                    );
                    state = next;
                }
                StageOutcome::Halt {
                    state,
                    message,
                    terminal,
                } => {
                    tracing::info!(
                        stage = stage.name(),
                        terminal = terminal.as_str(),
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Session finished"
                    );
                    return Ok(PipelineOutcome {
                        state: terminal,
                        message,
                        session: state,
                    });
                }
                StageOutcome::Fatal(error) => {
                    tracing::error!(
                        stage = stage.name(),
                        error = %error,
                        "Session aborted"
                    );
                    return Err(error);
                }
            }
        }

        // The composer always halts, so this is only reachable with custom stages.
        tracing::warn!("Pipeline ran out of stages without producing a message");
        Ok(PipelineOutcome {
            state: PipelineState::AnswerFailed,
            message: UserMessage::Notice(format!(
                "{}no answer was produced.",
                composer::COMPOSE_FAILED_PREFIX
            )),
            session: state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{chinook_schema, ColumnInfo, MockStore, QueryResult, Value};
    use crate::llm::MockLlmClient;
    use pretty_assertions::assert_eq;

    fn three_artists() -> QueryResult {
        QueryResult::with_data(
            vec![ColumnInfo::new("Name", "TEXT")],
            vec![
                vec![Value::from("AC/DC")],
                vec![Value::from("Accept")],
                vec![Value::from("Aerosmith")],
            ],
        )
    }

    fn pipeline(llm: &MockLlmClient, store: &MockStore) -> Pipeline {
        Pipeline::new(
            Arc::new(llm.clone()),
            Arc::new(store.clone()),
            &chinook_schema(),
            PipelineOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_list_all_artists_is_answered() {
        let llm = MockLlmClient::new().with_answer("artists", "The store has AC/DC, Accept and Aerosmith.");
        let store = MockStore::new().with_result("from artist", three_artists());

        let outcome = pipeline(&llm, &store).answer("List all artists").await.unwrap();

        assert_eq!(outcome.state, PipelineState::Answered);
        assert_eq!(
            outcome.message,
            UserMessage::Answer("The store has AC/DC, Accept and Aerosmith.".to_string())
        );
        assert!(!outcome.message.text().contains("SELECT"));
        assert_eq!(
            outcome.session.generated_sql(),
            Some("SELECT Name FROM Artist;")
        );
        assert_eq!(outcome.session.results().unwrap().row_count, 3);
        assert_eq!(
            outcome.session.results_table(),
            Some("Name\nAC/DC\nAccept\nAerosmith")
        );
        assert_eq!(store.stats().opened(), 1);
        assert_eq!(store.stats().closed(), 1);
        assert_eq!(llm.generation_calls(), 1);
        assert_eq!(llm.composition_calls(), 1);
    }

    #[tokio::test]
    async fn test_composer_sees_table_from_this_session() {
        let llm = MockLlmClient::new();
        let store = MockStore::new().with_result("from artist", three_artists());

        pipeline(&llm, &store).answer("List all artists").await.unwrap();

        let requests = llm.requests();
        let composer_system = &requests[1][0].content;
        assert!(composer_system.contains("Aerosmith"));
        assert!(!composer_system.contains("SELECT Name FROM Artist"));
    }

    #[tokio::test]
    async fn test_missing_sql_never_touches_store() {
        let llm = MockLlmClient::new();
        let store = MockStore::new();

        let outcome = pipeline(&llm, &store).answer("What is the weather?").await.unwrap();

        assert_eq!(outcome.state, PipelineState::SqlMissing);
        assert_eq!(
            outcome.message,
            UserMessage::Notice("No SQL query found in session state.".to_string())
        );
        assert_eq!(store.stats().opened(), 0);
        assert_eq!(llm.composition_calls(), 0);
    }

    #[tokio::test]
    async fn test_generation_failure_is_missing_sql() {
        let llm = MockLlmClient::new().failing_generation("rate limited");
        let store = MockStore::new();

        let outcome = pipeline(&llm, &store).answer("List all artists").await.unwrap();

        assert_eq!(outcome.state, PipelineState::SqlMissing);
        assert!(outcome.session.generated_sql().is_none());
        assert_eq!(store.stats().opened(), 0);
    }

    #[tokio::test]
    async fn test_store_error_reports_raw_text() {
        let llm = MockLlmClient::new().with_sql("nickname", "SELECT Nickname FROM Artist;");
        let store = MockStore::new().with_error("Nickname", "no such column: Nickname");

        let outcome = pipeline(&llm, &store).answer("Show artist nicknames").await.unwrap();

        assert_eq!(outcome.state, PipelineState::ExecutionError);
        assert_eq!(
            outcome.message,
            UserMessage::ExecutionError("Database error: no such column: Nickname".to_string())
        );
        assert_eq!(outcome.session.query_results().map(<[_]>::len), Some(0));
        assert_eq!(store.stats().open_connections(), 0);
        assert_eq!(llm.composition_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_result_halts_at_formatter() {
        let llm = MockLlmClient::new().with_sql("jazz", "SELECT Name FROM Artist WHERE Name = 'Nobody';");
        let store = MockStore::new();

        let outcome = pipeline(&llm, &store).answer("Artists called jazz").await.unwrap();

        assert_eq!(outcome.state, PipelineState::HaltedNoResults);
        assert_eq!(
            outcome.message,
            UserMessage::NoResults("No results to display for your query.".to_string())
        );
        assert!(outcome.session.results_table().is_none());
        assert_eq!(llm.composition_calls(), 0);
        assert_eq!(store.stats().closed(), 1);
    }

    #[tokio::test]
    async fn test_composition_failure_is_reported() {
        let llm = MockLlmClient::new().failing_composition("model overloaded");
        let store = MockStore::new().with_result("from artist", three_artists());

        let outcome = pipeline(&llm, &store).answer("List all artists").await.unwrap();

        assert_eq!(outcome.state, PipelineState::AnswerFailed);
        assert_eq!(
            outcome.message,
            UserMessage::Notice("Could not compose an answer: model overloaded".to_string())
        );
        assert!(outcome.session.final_answer().is_none());
    }

    #[tokio::test]
    async fn test_write_statement_is_rejected_before_connecting() {
        let llm = MockLlmClient::new().with_sql("remove", "DELETE FROM Artist;");
        let store = MockStore::new();

        let outcome = pipeline(&llm, &store).answer("Remove every artist").await.unwrap();

        assert_eq!(outcome.state, PipelineState::ExecutionError);
        assert!(outcome.message.text().starts_with("Query rejected: "));
        assert_eq!(store.stats().opened(), 0);
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let llm = MockLlmClient::new();
        let store = MockStore::new().with_result("from artist", three_artists());
        let pipeline = pipeline(&llm, &store);

        let (first, second) = tokio::join!(
            pipeline.answer("List all artists"),
            pipeline.answer("What is the weather?")
        );

        let (first, second) = (first.unwrap(), second.unwrap());
        assert_eq!(first.state, PipelineState::Answered);
        assert_eq!(second.state, PipelineState::SqlMissing);
        assert!(second.session.results().is_none());
        assert_eq!(store.stats().opened(), 1);
    }

    struct VanishedStore;

    impl StoreProvisioner for VanishedStore {
        fn ensure(&self) -> Result<crate::db::provision::Provisioned> {
            Err(AskError::provision("Store not found at Chinook.db"))
        }
    }

    #[tokio::test]
    async fn test_unprovisionable_store_aborts_the_run() {
        let llm = MockLlmClient::new();
        let store = MockStore::new().with_result("from artist", three_artists());
        let options = PipelineOptions {
            provisioner: Some(Arc::new(VanishedStore)),
            ..PipelineOptions::default()
        };
        let pipeline = Pipeline::new(
            Arc::new(llm.clone()),
            Arc::new(store.clone()),
            &chinook_schema(),
            options,
        );

        let err = pipeline.answer("List all artists").await.unwrap_err();

        assert!(matches!(err, AskError::Provision(_)));
        assert_eq!(store.stats().opened(), 0);
        assert_eq!(llm.composition_calls(), 0);
    }

    #[tokio::test]
    async fn test_custom_stages_without_halt() {
        let outcome = Pipeline::with_stages(vec![]).answer("anything").await.unwrap();
        assert_eq!(outcome.state, PipelineState::AnswerFailed);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(PipelineState::HaltedNoResults.to_string(), "HALTED_NO_RESULTS");
        assert_eq!(
            serde_json::to_value(PipelineState::SqlMissing).unwrap(),
            serde_json::json!("SQL_MISSING")
        );
    }

    #[test]
    fn test_message_serialization() {
        let json = serde_json::to_value(UserMessage::NoResults("none".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "no_results", "text": "none"}));
    }
}

//! End-to-end pipeline tests against a real SQLite file.

use super::common::seeded_store;
use chinook_ask::db::chinook_schema;
use chinook_ask::db::provision::FileProvisioner;
use chinook_ask::error::AskError;
use chinook_ask::llm::{LlmClient, MockLlmClient};
use chinook_ask::pipeline::{Pipeline, PipelineOptions, PipelineState, StateKey, UserMessage};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::tempdir;

async fn pipeline_with(llm: MockLlmClient, dir: &std::path::Path) -> Pipeline {
    let store = seeded_store(dir).await;
    let llm: Arc<dyn LlmClient> = Arc::new(llm);
    Pipeline::new(
        llm,
        Arc::new(store),
        &chinook_schema(),
        PipelineOptions::default(),
    )
}

#[tokio::test]
async fn test_list_artists_answers_from_results() {
    let dir = tempdir().unwrap();
    let llm = MockLlmClient::new();
    let pipeline = pipeline_with(llm.clone(), dir.path()).await;

    let outcome = pipeline.answer("List all artists").await.unwrap();

    assert_eq!(outcome.state, PipelineState::Answered);
    assert!(matches!(outcome.message, UserMessage::Answer(_)));
    assert!(!outcome.message.text().contains("SELECT"));

    let session = &outcome.session;
    assert_eq!(session.generated_sql(), Some("SELECT Name FROM Artist;"));
    assert_eq!(session.sql_query_used(), Some("SELECT Name FROM Artist;"));
    assert_eq!(session.query_results().map(|r| r.len()), Some(3));
    assert_eq!(
        session.results_table(),
        Some("Name\nAC/DC\nAccept\nAerosmith")
    );
    assert_eq!(session.final_answer(), Some(outcome.message.text()));

    assert_eq!(llm.generation_calls(), 1);
    assert_eq!(llm.composition_calls(), 1);

    let composition = llm.requests().pop().unwrap();
    assert!(composition
        .iter()
        .any(|m| m.content.contains("Name\nAC/DC\nAccept\nAerosmith")));
}

#[tokio::test]
async fn test_unknown_column_reports_database_error() {
    let dir = tempdir().unwrap();
    let llm = MockLlmClient::new().with_sql("nickname", "SELECT Nickname FROM Artist;");
    let pipeline = pipeline_with(llm.clone(), dir.path()).await;

    let outcome = pipeline.answer("What is each artist's nickname?").await.unwrap();

    assert_eq!(outcome.state, PipelineState::ExecutionError);
    assert_eq!(
        outcome.message,
        UserMessage::ExecutionError("Database error: no such column: Nickname".to_string())
    );
    assert_eq!(outcome.session.query_results().map(|r| r.len()), Some(0));
    assert!(!outcome.session.contains(StateKey::ResultsTable));
    assert_eq!(llm.composition_calls(), 0);
}

#[tokio::test]
async fn test_empty_result_halts_without_answer() {
    let dir = tempdir().unwrap();
    let llm = MockLlmClient::new().with_sql(
        "zeppelin",
        "SELECT Name FROM Artist WHERE Name = 'Led Zeppelin';",
    );
    let pipeline = pipeline_with(llm.clone(), dir.path()).await;

    let outcome = pipeline.answer("Is Led Zeppelin in the store?").await.unwrap();

    assert_eq!(outcome.state, PipelineState::HaltedNoResults);
    assert_eq!(
        outcome.message.text(),
        "No results to display for your query."
    );
    assert!(!outcome.session.contains(StateKey::FinalAnswer));
    assert_eq!(llm.composition_calls(), 0);
}

#[tokio::test]
async fn test_unanswerable_question_reports_missing_sql() {
    let dir = tempdir().unwrap();
    let pipeline = pipeline_with(MockLlmClient::new(), dir.path()).await;

    let outcome = pipeline.answer("What is the weather like?").await.unwrap();

    assert_eq!(outcome.state, PipelineState::SqlMissing);
    assert_eq!(
        outcome.message.text(),
        "No SQL query found in session state."
    );
}

#[tokio::test]
async fn test_write_statement_is_rejected_before_execution() {
    let dir = tempdir().unwrap();
    let llm = MockLlmClient::new().with_sql("remove", "DELETE FROM Artist;");
    let pipeline = pipeline_with(llm, dir.path()).await;

    let outcome = pipeline.answer("Remove every artist").await.unwrap();

    assert_eq!(outcome.state, PipelineState::ExecutionError);
    assert!(outcome.message.text().starts_with("Query rejected: "));

    let again = pipeline.answer("List all artists").await.unwrap();
    assert_eq!(again.session.query_results().map(|r| r.len()), Some(3));
}

#[tokio::test]
async fn test_fenced_sql_is_executed() {
    let dir = tempdir().unwrap();
    let llm = MockLlmClient::new().with_sql(
        "albums by accept",
        "```sql\nSELECT Title FROM Album WHERE ArtistId = 2 ORDER BY AlbumId;\n```",
    );
    let pipeline = pipeline_with(llm, dir.path()).await;

    let outcome = pipeline.answer("Which albums by Accept exist?").await.unwrap();

    assert_eq!(outcome.state, PipelineState::Answered);
    assert_eq!(
        outcome.session.results_table(),
        Some("Title\nBalls to the Wall\nRestless and Wild")
    );
}

#[tokio::test]
async fn test_same_sql_yields_identical_tables() {
    let dir = tempdir().unwrap();
    let llm = MockLlmClient::new().with_sql(
        "albums per artist",
        "SELECT ArtistId, COUNT(*) AS Albums FROM Album GROUP BY ArtistId ORDER BY ArtistId;",
    );
    let pipeline = pipeline_with(llm, dir.path()).await;

    let first = pipeline.answer("How many albums per artist?").await.unwrap();
    let second = pipeline.answer("How many albums per artist?").await.unwrap();

    let expected = "ArtistId  Albums\n       1       2\n       2       2";
    assert_eq!(first.session.results_table(), Some(expected));
    assert_eq!(second.session.results_table(), Some(expected));
}

#[tokio::test]
async fn test_composition_failure_is_reported() {
    let dir = tempdir().unwrap();
    let llm = MockLlmClient::new().failing_composition("rate limited");
    let pipeline = pipeline_with(llm, dir.path()).await;

    let outcome = pipeline.answer("List all artists").await.unwrap();

    assert_eq!(outcome.state, PipelineState::AnswerFailed);
    assert_eq!(
        outcome.message.text(),
        "Could not compose an answer: rate limited"
    );
    assert!(outcome.session.contains(StateKey::ResultsTable));
}

#[tokio::test]
async fn test_concurrent_sessions_are_isolated() {
    let dir = tempdir().unwrap();
    let pipeline = pipeline_with(MockLlmClient::new(), dir.path()).await;

    let (artists, albums) = tokio::join!(
        pipeline.answer("List all artists"),
        pipeline.answer("Show all albums")
    );
    let (artists, albums) = (artists.unwrap(), albums.unwrap());

    assert_eq!(artists.session.question(), "List all artists");
    assert_eq!(artists.session.query_results().map(|r| r.len()), Some(3));
    assert_eq!(albums.session.question(), "Show all albums");
    assert_eq!(albums.session.query_results().map(|r| r.len()), Some(4));
}

#[tokio::test]
async fn test_sqlite_limit_with_offset_is_answered() {
    let dir = tempdir().unwrap();
    let llm = MockLlmClient::new().with_sql(
        "second and third",
        "SELECT Name FROM Artist ORDER BY ArtistId LIMIT 1, 2;",
    );
    let pipeline = pipeline_with(llm, dir.path()).await;

    let outcome = pipeline
        .answer("Who are the second and third artists?")
        .await
        .unwrap();

    assert_eq!(outcome.state, PipelineState::Answered);
    assert_eq!(outcome.session.results_table(), Some("Name\nAccept\nAerosmith"));
}

#[tokio::test]
async fn test_glob_pattern_is_answered() {
    let dir = tempdir().unwrap();
    let llm = MockLlmClient::new().with_sql(
        "starting with ac",
        "SELECT Name FROM Artist WHERE Name GLOB 'Ac*' ORDER BY ArtistId;",
    );
    let pipeline = pipeline_with(llm, dir.path()).await;

    let outcome = pipeline
        .answer("Which artists have names starting with Ac?")
        .await
        .unwrap();

    assert_eq!(outcome.state, PipelineState::Answered);
    assert_eq!(outcome.session.results_table(), Some("Name\nAccept"));
}

#[tokio::test]
async fn test_store_removed_mid_run_stops_the_pipeline() {
    let dir = tempdir().unwrap();
    let store = seeded_store(dir.path()).await;
    let path = store.path().to_path_buf();
    let options = PipelineOptions {
        provisioner: Some(Arc::new(FileProvisioner::new(&path, None))),
        ..PipelineOptions::default()
    };
    let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::new());
    let pipeline = Pipeline::new(llm, Arc::new(store), &chinook_schema(), options);

    let first = pipeline.answer("List all artists").await.unwrap();
    assert_eq!(first.state, PipelineState::Answered);

    std::fs::remove_file(&path).unwrap();
    let err = pipeline.answer("List all artists").await.unwrap_err();

    assert!(matches!(err, AskError::Provision(_)));
}

//! Per-session state shared between pipeline stages.
//!
//! A `SessionState` is created empty for every question, handed from stage to
//! stage by value, and dropped when the session ends. Keys are only ever
//! added; the order of first write is recorded for the debug snapshot.

use std::fmt;

use serde::Serialize;

use crate::db::{QueryResult, Record};

/// Keys a stage may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKey {
    GeneratedSql,
    QueryResults,
    Results,
    ResultsTable,
    SqlQueryUsed,
    FinalAnswer,
}

impl StateKey {
    /// Returns the key name used in snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GeneratedSql => "generated_sql",
            Self::QueryResults => "query_results",
            Self::Results => "results",
            Self::ResultsTable => "results_table",
            Self::SqlQueryUsed => "sql_query_used",
            Self::FinalAnswer => "final_answer",
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed key-value state for one question's run through the pipeline.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    question: String,
    generated_sql: Option<String>,
    query_results: Option<Vec<Record>>,
    results: Option<QueryResult>,
    results_table: Option<String>,
    sql_query_used: Option<String>,
    final_answer: Option<String>,
    written: Vec<StateKey>,
}

impl SessionState {
    /// Creates an empty state for the given question.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    /// The question this session is answering.
    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn generated_sql(&self) -> Option<&str> {
        self.generated_sql.as_deref()
    }

    pub fn set_generated_sql(&mut self, sql: impl Into<String>) {
        self.generated_sql = Some(sql.into());
        self.record(StateKey::GeneratedSql);
    }

    /// Result rows as ordered record mappings.
    pub fn query_results(&self) -> Option<&[Record]> {
        self.query_results.as_deref()
    }

    /// Result in tabular form.
    pub fn results(&self) -> Option<&QueryResult> {
        self.results.as_ref()
    }

    /// Stores an executed result in both its record and tabular forms.
    pub fn set_results(&mut self, result: QueryResult) {
        self.query_results = Some(result.to_records());
        self.record(StateKey::QueryResults);
        self.results = Some(result);
        self.record(StateKey::Results);
    }

    /// Stores an empty result, used when execution fails.
    pub fn clear_results(&mut self) {
        self.set_results(QueryResult::new());
    }

    pub fn results_table(&self) -> Option<&str> {
        self.results_table.as_deref()
    }

    pub fn set_results_table(&mut self, table: impl Into<String>) {
        self.results_table = Some(table.into());
        self.record(StateKey::ResultsTable);
    }

    /// Copy of the executed SQL, kept for debugging only.
    pub fn sql_query_used(&self) -> Option<&str> {
        self.sql_query_used.as_deref()
    }

    pub fn set_sql_query_used(&mut self, sql: impl Into<String>) {
        self.sql_query_used = Some(sql.into());
        self.record(StateKey::SqlQueryUsed);
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }

    pub fn set_final_answer(&mut self, answer: impl Into<String>) {
        self.final_answer = Some(answer.into());
        self.record(StateKey::FinalAnswer);
    }

    /// Keys written so far, in order of first write.
    pub fn written_keys(&self) -> &[StateKey] {
        &self.written
    }

    /// Returns true if the key has been written.
    pub fn contains(&self, key: StateKey) -> bool {
        self.written.contains(&key)
    }

    /// Renders the written keys as an ordered JSON mapping.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();

        for key in &self.written {
            let value = match key {
                StateKey::GeneratedSql => string_value(&self.generated_sql),
                StateKey::QueryResults => self
                    .query_results
                    .as_ref()
                    .map(|records| {
                        serde_json::Value::Array(
                            records
                                .iter()
                                .cloned()
                                .map(serde_json::Value::Object)
                                .collect(),
                        )
                    })
                    .unwrap_or(serde_json::Value::Null),
                StateKey::Results => self
                    .results
                    .as_ref()
                    .map(|r| {
                        serde_json::json!({
                            "columns": r.column_names(),
                            "row_count": r.row_count,
                        })
                    })
                    .unwrap_or(serde_json::Value::Null),
                StateKey::ResultsTable => string_value(&self.results_table),
                StateKey::SqlQueryUsed => string_value(&self.sql_query_used),
                StateKey::FinalAnswer => string_value(&self.final_answer),
            };
            map.insert(key.as_str().to_string(), value);
        }

        serde_json::Value::Object(map)
    }

    fn record(&mut self, key: StateKey) {
        if !self.written.contains(&key) {
            self.written.push(key);
        }
    }
}

fn string_value(value: &Option<String>) -> serde_json::Value {
    value
        .as_ref()
        .map(|s| serde_json::Value::String(s.clone()))
        .unwrap_or(serde_json::Value::Null)
}

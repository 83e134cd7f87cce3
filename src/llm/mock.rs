//! Mock LLM client for testing.
//!
//! Provides deterministic responses based on input patterns. Generation and
//! composition requests are told apart by the generator's system instruction.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::error::{AskError, Result};
use crate::llm::prompt::SQL_GENERATOR_MARKER;
use crate::llm::types::{Message, Role};
use crate::llm::LlmClient;

/// Built-in question patterns for the Chinook store. Every keyword must appear.
const DEFAULT_SQL: &[(&[&str], &str)] = &[
    (&["how many", "track"], "SELECT COUNT(*) AS TrackCount FROM Track;"),
    (
        &["album", "artist"],
        "SELECT ar.Name, COUNT(al.AlbumId) AS AlbumCount FROM Artist ar JOIN Album al ON al.ArtistId = ar.ArtistId GROUP BY ar.Name ORDER BY AlbumCount DESC;",
    ),
    (&["artists"], "SELECT Name FROM Artist;"),
    (&["genres"], "SELECT Name FROM Genre;"),
    (&["albums"], "SELECT Title FROM Album;"),
    (
        &["customers", "country"],
        "SELECT Country, COUNT(*) AS Customers FROM Customer GROUP BY Country ORDER BY Customers DESC;",
    ),
    (&["employees"], "SELECT FirstName, LastName, Title FROM Employee;"),
];

/// Mock LLM client that returns canned responses based on input patterns.
///
/// Used for unit testing without making real API calls. Every request is
/// recorded so tests can assert what each stage sent.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    /// Custom SQL mappings (question pattern -> SQL).
    sql_responses: Vec<(String, String)>,
    /// Custom answer mappings (question pattern -> answer).
    answer_responses: Vec<(String, String)>,
    /// Error returned for generation requests.
    generation_error: Option<String>,
    /// Error returned for composition requests.
    composition_error: Option<String>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockLlmClient {
    /// Creates a new mock client with default responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a custom SQL mapping.
    ///
    /// When a generation request's question contains `pattern`, the mock returns `sql`.
    pub fn with_sql(mut self, pattern: impl Into<String>, sql: impl Into<String>) -> Self {
        self.sql_responses.push((pattern.into(), sql.into()));
        self
    }

    /// Adds a custom answer mapping for composition requests.
    pub fn with_answer(mut self, pattern: impl Into<String>, answer: impl Into<String>) -> Self {
        self.answer_responses.push((pattern.into(), answer.into()));
        self
    }

    /// Fails every generation request with the given message.
    pub fn failing_generation(mut self, message: impl Into<String>) -> Self {
        self.generation_error = Some(message.into());
        self
    }

    /// Fails every composition request with the given message.
    pub fn failing_composition(mut self, message: impl Into<String>) -> Self {
        self.composition_error = Some(message.into());
        self
    }

    /// Returns every request received so far, in order.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.lock_requests().clone()
    }

    /// Number of SQL generation requests received.
    pub fn generation_calls(&self) -> usize {
        self.lock_requests()
            .iter()
            .filter(|r| Self::is_generation(r))
            .count()
    }

    /// Number of answer composition requests received.
    pub fn composition_calls(&self) -> usize {
        self.lock_requests()
            .iter()
            .filter(|r| !Self::is_generation(r))
            .count()
    }

    fn lock_requests(&self) -> std::sync::MutexGuard<'_, Vec<Vec<Message>>> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_generation(messages: &[Message]) -> bool {
        messages
            .iter()
            .any(|m| m.role == Role::System && m.content.contains(SQL_GENERATOR_MARKER))
    }

    /// Extracts the last user message content from a message list.
    fn extract_user_input(messages: &[Message]) -> String {
        messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }

    fn mock_sql(&self, question: &str) -> String {
        let question_lower = question.to_lowercase();

        for (pattern, sql) in &self.sql_responses {
            if question_lower.contains(&pattern.to_lowercase()) {
                return sql.clone();
            }
        }

        DEFAULT_SQL
            .iter()
            .find(|(keywords, _)| keywords.iter().all(|k| question_lower.contains(k)))
            .map(|(_, sql)| sql.to_string())
            .unwrap_or_default()
    }

    fn mock_answer(&self, question: &str) -> String {
        let question_lower = question.to_lowercase();

        for (pattern, answer) in &self.answer_responses {
            if question_lower.contains(&pattern.to_lowercase()) {
                return answer.clone();
            }
        }

        format!("Here is what the results show for \"{}\".", question.trim())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        self.lock_requests().push(messages.to_vec());
        let input = Self::extract_user_input(messages);

        if Self::is_generation(messages) {
            match &self.generation_error {
                Some(message) => Err(AskError::llm(message.clone())),
                None => Ok(self.mock_sql(&input)),
            }
        } else {
            match &self.composition_error {
                Some(message) => Err(AskError::llm(message.clone())),
                None => Ok(self.mock_answer(&input)),
            }
        }
    }
}

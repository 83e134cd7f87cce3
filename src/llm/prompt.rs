//! Prompt construction for LLM requests.
//!
//! Builds the two system instructions the pipeline sends: one for SQL
//! generation with the schema embedded, one for answer composition with the
//! formatted result table embedded.

use crate::db::Schema;
use crate::llm::types::Message;

/// Opening line of the generation instruction. The mock client keys on it.
pub const SQL_GENERATOR_MARKER: &str = "You are an expert SQL query generator.";

/// System prompt template for SQL generation.
const GENERATOR_PROMPT_TEMPLATE: &str = r#"{marker} Convert natural language questions into precise SQL queries for a SQLite database. The database schema is as follows:

{schema}

Generate ONLY the SQL query without any explanation, comments, or markdown formatting.
Do not output "Here is the SQL query:" or similar text. Generate just the raw SQL code."#;

/// System prompt template for answer composition.
const COMPOSER_PROMPT_TEMPLATE: &str = r#"You are a helpful database assistant. Provide a clear and concise response based on the SQL query results below.

QUERY RESULTS:
{table}

Your response should focus ONLY on:
1. The results of the query (already formatted as a table)
2. A brief, clear explanation of what these results mean in relation to the user's question

DO NOT include the SQL query itself in your response. The user only wants to see the results and an explanation.
Only state facts that appear in the results above. Never invent rows, values or totals.
Keep your response focused on the data and avoid unnecessary elaboration."#;

/// Builds the SQL generation instruction with the schema embedded.
pub fn build_generator_prompt(schema: &Schema) -> String {
    GENERATOR_PROMPT_TEMPLATE
        .replace("{marker}", SQL_GENERATOR_MARKER)
        .replace("{schema}", schema.format_for_llm().trim_end())
}

/// Builds the answer composition instruction with the result table embedded.
pub fn build_composer_prompt(table: &str) -> String {
    COMPOSER_PROMPT_TEMPLATE.replace("{table}", table)
}

/// Builds the generation request for a question.
pub fn generator_messages(schema: &Schema, question: &str) -> Vec<Message> {
    vec![
        Message::system(build_generator_prompt(schema)),
        Message::user(question),
    ]
}

/// Builds the composition request for a question and its result table.
pub fn composer_messages(table: &str, question: &str) -> Vec<Message> {
    vec![
        Message::system(build_composer_prompt(table)),
        Message::user(question),
    ]
}

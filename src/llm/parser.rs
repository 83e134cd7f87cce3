//! Response normalization for generated SQL.
//!
//! The generator is instructed to return raw SQL, but models still wrap the
//! statement in a markdown fence now and then. Only that wrapper is removed;
//! the statement itself is passed through untouched.

use regex::Regex;
use std::sync::OnceLock;

/// Matches a completion that is entirely one fenced block, optionally tagged `sql`/`sqlite`.
fn fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)^\s*```[ \t]*(?:sql|sqlite)?[ \t]*\r?\n(.*?)\r?\n?[ \t]*```\s*$")
            .unwrap_or_else(|e| panic!("invalid fence pattern: {e}"))
    })
}

/// Removes a markdown fence wrapping the whole completion and trims whitespace.
///
/// Text that is not a single fenced block is returned trimmed but otherwise
/// unchanged, including prose the model added around a statement.
pub fn strip_sql_fences(response: &str) -> String {
    match fence_pattern().captures(response) {
        Some(captures) => captures
            .get(1)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default(),
        None => response.trim().to_string(),
    }
}

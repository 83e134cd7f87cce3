//! Result formatting stage.
//!
//! Renders a result as a plain fixed-width text table: a header row, then one
//! line per row, columns separated by two spaces. Numeric columns are
//! right-aligned, everything else left-aligned. Nothing is truncated.

use async_trait::async_trait;

use super::{PipelineState, SessionState, Stage, StageOutcome, UserMessage};
use crate::db::{QueryResult, Value};

/// Notice shown when there is nothing to format.
pub const NO_RESULTS_MESSAGE: &str = "No results to display for your query.";

/// Gap between columns.
const COLUMN_SEPARATOR: &str = "  ";

/// Formats `results` into `results_table`, or halts when there are no rows.
#[derive(Debug, Default)]
pub struct ResultFormatter;

impl ResultFormatter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Stage for ResultFormatter {
    fn name(&self) -> &'static str {
        "result_formatter"
    }

    async fn run(&self, mut state: SessionState) -> StageOutcome {
        let table = state
            .results()
            .filter(|result| !result.is_empty())
            .map(render_table);
        let Some(table) = table else {
            return StageOutcome::Halt {
                state,
                message: UserMessage::NoResults(NO_RESULTS_MESSAGE.to_string()),
                terminal: PipelineState::HaltedNoResults,
            };
        };

        if let Some(sql) = state.generated_sql().map(str::to_string) {
            tracing::info!(sql = %sql, "SQL query used");
            state.set_sql_query_used(sql);
        }
        state.set_results_table(table);

        StageOutcome::Continue(state)
    }
}

/// Renders a result as a fixed-width text table.
pub fn render_table(result: &QueryResult) -> String {
    let column_count = result.columns.len();
    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| {
            (0..column_count)
                .map(|i| row.get(i).map(Value::to_display_string).unwrap_or_default())
                .collect()
        })
        .collect();

    let right_aligned: Vec<bool> = (0..column_count)
        .map(|i| is_numeric_column(result, i))
        .collect();

    let mut widths: Vec<usize> = result
        .columns
        .iter()
        .map(|col| col.name.chars().count())
        .collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let header: Vec<String> = result.columns.iter().map(|c| c.name.clone()).collect();
    let mut lines = Vec::with_capacity(cells.len() + 1);
    lines.push(render_line(&header, &widths, &right_aligned));
    for row in &cells {
        lines.push(render_line(row, &widths, &right_aligned));
    }

    lines.join("\n")
}

/// A column is numeric when it has at least one value and all non-NULL values are numbers.
fn is_numeric_column(result: &QueryResult, index: usize) -> bool {
    let mut values = result
        .rows
        .iter()
        .filter_map(|row| row.get(index))
        .filter(|v| !v.is_null())
        .peekable();

    values.peek().is_some() && values.all(Value::is_numeric)
}

fn render_line(cells: &[String], widths: &[usize], right_aligned: &[bool]) -> String {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .zip(right_aligned)
        .map(|((cell, &width), &right)| {
            if right {
                format!("{:>width$}", cell, width = width)
            } else {
                format!("{:<width$}", cell, width = width)
            }
        })
        .collect();

    padded.join(COLUMN_SEPARATOR).trim_end().to_string()
}

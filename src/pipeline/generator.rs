//! SQL generation stage.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use super::{SessionState, Stage, StageOutcome};
use crate::db::Schema;
use crate::llm::prompt::generator_messages;
use crate::llm::{strip_sql_fences, LlmClient};

/// Turns the question into one SQL string using the embedded schema.
///
/// The completion is stored as `generated_sql` without validation. An empty
/// completion or a failed request leaves the key absent so the executor
/// reports the missing input.
pub struct SqlGenerator {
    llm: Arc<dyn LlmClient>,
    schema: Schema,
}

impl SqlGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, schema: &Schema) -> Self {
        Self {
            llm,
            schema: schema.clone(),
        }
    }
}

#[async_trait]
impl Stage for SqlGenerator {
    fn name(&self) -> &'static str {
        "sql_generator"
    }

    async fn run(&self, mut state: SessionState) -> StageOutcome {
        let messages = generator_messages(&self.schema, state.question());

        let start = Instant::now();
        match self.llm.complete(&messages).await {
            Ok(completion) => {
                let sql = strip_sql_fences(&completion);
                tracing::debug!(
                    duration_ms = start.elapsed().as_millis() as u64,
                    sql_len = sql.len(),
                    "Received SQL from LLM"
                );
                if sql.is_empty() {
                    tracing::warn!("LLM returned an empty completion for SQL generation");
                } else {
                    state.set_generated_sql(sql);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SQL generation failed");
            }
        }

        StageOutcome::Continue(state)
    }
}

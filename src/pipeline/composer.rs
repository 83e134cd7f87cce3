//! Answer composition stage.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use super::{PipelineState, SessionState, Stage, StageOutcome, UserMessage};
use crate::llm::prompt::composer_messages;
use crate::llm::LlmClient;

/// Prefix of the notice shown when composition fails.
pub const COMPOSE_FAILED_PREFIX: &str = "Could not compose an answer: ";

/// Explains the formatted table in prose.
///
/// The table is read from the session state on every call and embedded in
/// the instruction, so each answer is grounded in its own session's rows.
pub struct AnswerComposer {
    llm: Arc<dyn LlmClient>,
}

impl AnswerComposer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Stage for AnswerComposer {
    fn name(&self) -> &'static str {
        "answer_composer"
    }

    async fn run(&self, mut state: SessionState) -> StageOutcome {
        let Some(table) = state.results_table().map(str::to_string) else {
            return StageOutcome::Halt {
                state,
                message: UserMessage::Notice(format!(
                    "{COMPOSE_FAILED_PREFIX}no formatted results are available."
                )),
                terminal: PipelineState::AnswerFailed,
            };
        };

        let messages = composer_messages(&table, state.question());
        let start = Instant::now();

        match self.llm.complete(&messages).await {
            Ok(answer) => {
                let answer = answer.trim().to_string();
                tracing::debug!(
                    duration_ms = start.elapsed().as_millis() as u64,
                    answer_len = answer.len(),
                    "Received answer from LLM"
                );
                state.set_final_answer(answer.clone());
                StageOutcome::Halt {
                    state,
                    message: UserMessage::Answer(answer),
                    terminal: PipelineState::Answered,
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Answer composition failed");
                StageOutcome::Halt {
                    state,
                    message: UserMessage::Notice(format!("{COMPOSE_FAILED_PREFIX}{}", e.detail())),
                    terminal: PipelineState::AnswerFailed,
                }
            }
        }
    }
}

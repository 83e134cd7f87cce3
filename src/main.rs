//! chinook-ask - natural-language questions over the Chinook music store.

use std::path::Path;
use std::sync::Arc;

use chinook_ask::cli::{normalize_question, read_question_file, Cli, InputMode};
use chinook_ask::config::Config;
use chinook_ask::db::provision::{ensure_store, Provisioned};
use chinook_ask::db::{chinook_schema, verify_schema, SqliteStore};
use chinook_ask::error::{AskError, Result};
use chinook_ask::llm::{create_client, LlmClient};
use chinook_ask::logging::{self, LogTarget};
use chinook_ask::pipeline::{Pipeline, PipelineOutcome};
use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    let dotenv = dotenvy::dotenv();

    logging::init(LogTarget::from_flag(cli.log_file));

    match dotenv {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("Could not load .env file: {e}"),
    }

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e.detail());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;
    config.apply_env_overrides();
    cli.apply_to(&mut config);
    config.validate()?;

    let mode = cli.input_mode()?;

    match ensure_store(&config.store.path, config.store.source.as_deref())? {
        Provisioned::AlreadyPresent => debug!("Using store at {}", config.store.path.display()),
        Provisioned::CopiedFrom(source) => info!(
            "Provisioned store at {} from {}",
            config.store.path.display(),
            source.display()
        ),
    }

    let store = Arc::new(SqliteStore::new(&config.store.path));
    let schema = chinook_schema();
    verify_schema(store.as_ref(), &schema, config.store.strict_schema).await?;

    let settings = config.client_settings()?;
    info!(provider = %settings.provider, "Using LLM provider");
    let llm: Arc<dyn LlmClient> = Arc::from(create_client(&settings)?);

    let pipeline = Pipeline::new(llm, store, &schema, config.pipeline_options());

    match mode {
        InputMode::Single(question) => {
            let outcome = pipeline.answer(&question).await?;
            report(&cli, &question, &outcome);
        }
        InputMode::File(path) => answer_file(&cli, &pipeline, &path).await?,
        InputMode::Stdin => answer_stdin(&cli, &pipeline).await?,
    }

    Ok(())
}

/// Answers every question in a file, several at a time, printing in input order.
async fn answer_file(cli: &Cli, pipeline: &Pipeline, path: &Path) -> Result<()> {
    let questions = read_question_file(path)?;
    info!(
        count = questions.len(),
        concurrency = cli.concurrency,
        "Answering questions from {}",
        path.display()
    );

    let outcomes: Vec<PipelineOutcome> = stream::iter(questions.iter())
        .map(|question| pipeline.answer(question))
        .buffered(usize::from(cli.concurrency))
        .try_collect()
        .await?;

    for (question, outcome) in questions.iter().zip(&outcomes) {
        report(cli, question, outcome);
    }

    Ok(())
}

/// Answers questions read line by line from stdin, one at a time.
async fn answer_stdin(cli: &Cli, pipeline: &Pipeline) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| AskError::internal(format!("Failed to read stdin: {e}")))?
    {
        let Some(question) = normalize_question(&line) else {
            debug!("Skipping empty question");
            continue;
        };
        let outcome = pipeline.answer(&question).await?;
        report(cli, &question, &outcome);
    }

    Ok(())
}

/// Prints the single user-visible message of a session.
fn report(cli: &Cli, question: &str, outcome: &PipelineOutcome) {
    if cli.debug_state {
        info!(
            terminal = %outcome.state,
            state = %outcome.session.to_json(),
            "Session state snapshot"
        );
    }

    if cli.json {
        let line = serde_json::json!({
            "question": question,
            "state": outcome.state,
            "message": outcome.message,
        });
        println!("{line}");
    } else {
        println!("{}", outcome.message);
    }
}

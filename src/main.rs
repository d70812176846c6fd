#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # mailgrader
//!
//! Runs one grading batch over a mailbox and prints a summary.
//!
//! Credentials and file locations are read from the environment (a `.env`
//! file in the working directory is loaded first); grading instructions come
//! from a JSON file, `config.json` by default.

use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use bpaf::*;
use dotenvy::dotenv;
use mailgrader::{
    GraderError, Pipeline, RunSummary, Stage,
    config::{Config, PromptConfig},
    constants::DEFAULT_PROMPT_CONFIG,
    extract::SubmissionExtractor,
    grading::{GradingClient, OpenAiBackend},
    mailbox::{Allowlist, ImapMailbox},
    record_log::RecordLog,
    roster::{Question, load_allowlist, load_question},
    sink::{JsonLinesSink, PostgrestSink, ResultSink},
};
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Command line options.
#[derive(Debug, Clone)]
struct Opts {
    /// Path to the JSON prompt configuration.
    config:     PathBuf,
    /// Submission extension override.
    extension:  Option<String>,
    /// Record log override.
    record_log: Option<PathBuf>,
    /// Print records instead of persisting them.
    dry_run:    bool,
    /// Log at debug level.
    verbose:    bool,
}

/// Parse the command line arguments and return an `Opts` struct
fn options() -> Opts {
    let config = long("config")
        .short('c')
        .help("Path to the JSON file holding the grading prompt")
        .argument::<PathBuf>("PATH")
        .fallback(PathBuf::from(DEFAULT_PROMPT_CONFIG));

    let extension = long("extension")
        .short('e')
        .help("Extension of attachments treated as submissions (default: py)")
        .argument::<String>("EXT")
        .optional();

    let record_log = long("record-log")
        .help("Append every extracted record to this CSV file")
        .argument::<PathBuf>("PATH")
        .optional();

    let dry_run = long("dry-run")
        .help("Print records as JSON lines instead of storing them")
        .switch();

    let verbose = short('v')
        .long("verbose")
        .help("Log debug output")
        .switch();

    construct!(Opts {
        config,
        extension,
        record_log,
        dry_run,
        verbose
    })
    .to_options()
    .descr("Grade emailed homework submissions with a language model")
    .run()
}

/// Loads everything the run needs, failing before any mailbox I/O when
/// something is missing.
fn load_config(opts: &Opts) -> Result<Config> {
    let prompt = PromptConfig::load(&opts.config)?;
    let mut config = Config::from_env(prompt, !opts.dry_run)?;

    if let Some(extension) = &opts.extension {
        config = config.with_extension(extension.clone());
    }
    if let Some(path) = &opts.record_log {
        config = config.with_record_log(path.clone());
    }

    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}

/// Runs the pipeline against the configured mailbox with `sink`.
async fn execute<K: ResultSink>(
    config: &Config,
    allowlist: &Allowlist,
    question: Question,
    sink: K,
) -> Result<RunSummary> {
    let backend = OpenAiBackend::new(&config.openai)?;

    let pipeline = Pipeline::builder()
        .extractor(SubmissionExtractor::new(&config.extension))
        .grader(GradingClient::new(backend))
        .sink(sink)
        .question(question)
        .prompt(config.prompt.clone())
        .maybe_record_log(config.record_log.clone().map(RecordLog::new))
        .build();

    let mailbox = &config.mailbox;
    let mut source = ImapMailbox::open(
        &mailbox.host,
        mailbox.port,
        &mailbox.address,
        &mailbox.credential,
        &mailbox.folder,
    )?;

    Ok(pipeline.run(&mut source, allowlist).await)
}

/// Loads the inputs and runs one batch.
async fn run(opts: &Opts) -> Result<RunSummary> {
    tracing::debug!(stage = %Stage::Init, "loading {}", opts.config.display());
    let config = load_config(opts)?;
    let allowlist = load_allowlist(&config.roster_path)?;
    let question = load_question(&config.question_path)?;
    tracing::info!(
        "Grading session `{}` for {} allowed senders",
        question.session,
        allowlist.len()
    );

    if opts.dry_run {
        execute(&config, &allowlist, question, JsonLinesSink).await
    } else {
        let store = config
            .store
            .as_ref()
            .context("Document store is not configured")?;
        execute(&config, &allowlist, question, PostgrestSink::new(store)).await
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenv().ok();
    let opts = options();

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);
    let filter_layer = LevelFilter::from_level(if opts.verbose { Level::DEBUG } else { Level::INFO });
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    match run(&opts).await {
        Ok(summary) => {
            eprintln!("{}", summary.render());
            ExitCode::from(summary.exit_code())
        }
        Err(e) => {
            let stage = e
                .downcast_ref::<GraderError>()
                .map_or(Stage::Init, GraderError::stage);
            tracing::error!(%stage, "{e:#}");
            ExitCode::from(2)
        }
    }
}

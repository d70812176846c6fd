#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::fmt::Display;

use colored::Colorize;
use tabled::{
    Table, Tabled,
    settings::{Modify, Panel, Style, Width, object::Columns},
};

/// Stages a run goes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Configuration and inputs are being loaded.
    Init,
    /// Messages are being listed from the mailbox.
    Fetching,
    /// A message is being turned into a record.
    Extracting,
    /// A record's subject is being compared with the session.
    Filtering,
    /// A record is being graded.
    Grading,
    /// The batch is being persisted.
    Persisting,
    /// The run is over.
    Done,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::Fetching => "fetching",
            Stage::Extracting => "extracting",
            Stage::Filtering => "filtering",
            Stage::Grading => "grading",
            Stage::Persisting => "persisting",
            Stage::Done => "done",
        };
        write!(f, "{name}")
    }
}

/// A failure confined to one record.
#[derive(Debug, Clone, PartialEq, Tabled)]
pub struct RecordFailure {
    #[tabled(rename = "Message")]
    /// * `message_id`: message the failure belongs to
    pub message_id: String,
    #[tabled(rename = "Stage")]
    /// * `stage`: stage the failure happened in
    pub stage:      Stage,
    #[tabled(rename = "Error")]
    /// * `error`: what went wrong
    pub error:      String,
}

/// Counts and failures of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Identifier of the run, as logged.
    pub run_id:            String,
    /// Messages received from allow-listed senders.
    pub fetched:           usize,
    /// Records produced by the extractor.
    pub extracted:         usize,
    /// Replies and forwards left out.
    pub excluded:          usize,
    /// Records whose subject named the session.
    pub matched:           usize,
    /// Records that received a grade.
    pub graded:            usize,
    /// Records stored by the sink.
    pub persisted:         usize,
    /// Per-record failures, in the order they happened.
    pub failures:          Vec<RecordFailure>,
    /// Why persisting the batch failed, if it did.
    pub persistence_error: Option<String>,
}

/// One line of the counts table.
#[derive(Tabled)]
struct CountRow {
    /// Counter name.
    #[tabled(rename = "Records")]
    name:  &'static str,
    /// Counter value.
    #[tabled(rename = "Count")]
    count: usize,
}

impl RunSummary {
    /// Whether every record and the batch went through without errors.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.persistence_error.is_none()
    }

    /// Process exit code for this summary.
    pub fn exit_code(&self) -> u8 {
        if self.is_success() { 0 } else { 1 }
    }

    /// Records a failure for `message_id`.
    pub fn fail(&mut self, message_id: &str, stage: Stage, error: impl Display) {
        let error = error.to_string();
        tracing::warn!(message_id, %stage, "{error}");
        self.failures.push(RecordFailure {
            message_id: message_id.to_string(),
            stage,
            error,
        });
    }

    /// Renders the summary as tables followed by a status line.
    pub fn render(&self) -> String {
        let counts = [
            ("fetched", self.fetched),
            ("extracted", self.extracted),
            ("excluded", self.excluded),
            ("matched", self.matched),
            ("graded", self.graded),
            ("persisted", self.persisted),
            ("failed", self.failures.len()),
        ]
        .into_iter()
        .map(|(name, count)| CountRow { name, count })
        .collect::<Vec<_>>();

        let mut out = Table::new(counts)
            .with(Panel::header(format!("Run {}", self.run_id)))
            .with(Style::modern())
            .to_string();

        if !self.failures.is_empty() {
            out.push('\n');
            out.push_str(
                &Table::new(&self.failures)
                    .with(Panel::header("Failures"))
                    .with(Modify::new(Columns::last()).with(Width::wrap(60).keep_words(true)))
                    .with(Style::modern())
                    .to_string(),
            );
        }

        out.push('\n');
        let status = match &self.persistence_error {
            Some(e) => format!("Results were not persisted: {e}").red().to_string(),
            None if self.failures.is_empty() => "All records processed".green().to_string(),
            None => format!("{} record(s) failed", self.failures.len())
                .yellow()
                .to_string(),
        };
        out.push_str(&status);
        out
    }
}

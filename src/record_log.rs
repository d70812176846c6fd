#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Append-only CSV log of extracted records, one row per message.

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use itertools::Itertools;

use crate::{record::SubmissionRecord, roster::Table};

/// Column holding the message identifier, used to skip duplicates.
const ID_COLUMN: &str = "message_id";

/// Columns written when a new log is created.
pub const LOG_COLUMNS: [&str; 10] = [
    ID_COLUMN,
    "sender_name",
    "sender_address",
    "received_date",
    "received_time",
    "subject",
    "attachment_count",
    "submission_text",
    "grading_reply",
    "grade",
];

/// A CSV file that records are appended to, never rewritten.
#[derive(Debug, Clone)]
pub struct RecordLog {
    /// Location of the CSV file.
    path: PathBuf,
}

impl RecordLog {
    /// Creates a log at `path`; the file is created on the first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the location of the log.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `record` unless a row with the same `message_id` exists.
    ///
    /// Returns whether a row was written. Columns of an existing log are kept
    /// as they are; values for unknown columns are left empty.
    pub fn append(&self, record: &SubmissionRecord) -> Result<bool> {
        let existing = if self.path.exists() {
            std::fs::read_to_string(&self.path)
                .with_context(|| format!("Could not read {}", self.path.display()))?
        } else {
            String::new()
        };

        let (headers, new_file) = if !existing.trim().is_empty() {
            let table = Table::parse(&existing)
                .with_context(|| format!("Could not parse {}", self.path.display()))?;

            let Some(id_column) = table.column(ID_COLUMN) else {
                bail!("`{ID_COLUMN}` column not found in {}", self.path.display());
            };
            if table.values(id_column).any(|id| id == record.message_id) {
                tracing::debug!(message_id = %record.message_id, "already in the record log");
                return Ok(false);
            }

            let headers = table.headers().to_vec();
            (headers, false)
        } else {
            (LOG_COLUMNS.iter().map(|c| c.to_string()).collect(), true)
        };

        let mut out = String::new();
        if new_file {
            out.push_str(&csv_line(headers.iter().map(String::as_str)));
        } else if !existing.ends_with(['\n', '\r']) {
            // Logs edited by hand often lack the final line break.
            out.push('\n');
        }
        let cells = headers
            .iter()
            .map(|h| cell(record, h).unwrap_or_default())
            .collect::<Vec<_>>();
        out.push_str(&csv_line(cells.iter().map(String::as_str)));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Could not open {}", self.path.display()))?;
        file.write_all(out.as_bytes())
            .with_context(|| format!("Could not write {}", self.path.display()))?;

        Ok(true)
    }
}

/// Returns the value of `column` for `record`, if the column is known.
fn cell(record: &SubmissionRecord, column: &str) -> Option<String> {
    Some(match column {
        ID_COLUMN => record.message_id.clone(),
        "sender_name" => record.sender_name.clone(),
        "sender_address" => record.sender_address.clone(),
        "received_date" => record.received_date.clone(),
        "received_time" => record.received_time.clone(),
        "subject" => record.subject.clone(),
        "attachment_count" => record.attachment_count.to_string(),
        "submission_text" => record.submission_text.clone(),
        "grading_reply" => record.grading_reply.clone().unwrap_or_default(),
        "grade" => record.grade.map(|g| g.to_string()).unwrap_or_default(),
        _ => return None,
    })
}

/// Formats one CSV line, quoting fields that need it.
fn csv_line<'a>(fields: impl Iterator<Item = &'a str>) -> String {
    let line = fields
        .map(|f| {
            if f.contains([',', '"', '\r', '\n']) {
                format!("\"{}\"", f.replace('"', "\"\""))
            } else {
                f.to_string()
            }
        })
        .join(",");
    format!("{line}\n")
}

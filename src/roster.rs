#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Readers for the sender roster and the question file.

use std::path::Path;

use crate::{
    constants::{ALLOWLIST_COLUMN, QUESTION_COLUMN, SESSION_COLUMN},
    error::GraderError,
    mailbox::Allowlist,
    parsers::parse_csv,
};

/// The question being graded and the session it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Question text sent to the grading backend.
    pub question: String,
    /// Session identifier, compared with email subjects.
    pub session:  String,
}

/// A CSV file split into its header row and data rows.
#[derive(Debug, Clone)]
pub struct Table {
    /// Column names, trimmed.
    headers: Vec<String>,
    /// Remaining rows.
    rows:    Vec<Vec<String>>,
}

impl Table {
    /// Parses CSV text. The first record is the header row.
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let mut records = parse_csv(text)?.into_iter();
        let headers = records
            .next()
            .unwrap_or_default()
            .into_iter()
            .map(|h| h.trim().to_string())
            .collect();

        Ok(Self {
            headers,
            rows: records.collect(),
        })
    }

    /// Returns the index of the column called `name`.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Returns every value of column `index`; short rows yield nothing.
    pub fn values(&self, index: usize) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .filter_map(move |row| row.get(index).map(String::as_str))
    }

    /// Returns the column names.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Returns the data rows.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }
}

/// Reads `path` into a [`Table`], reporting failures as configuration errors.
fn read_table(path: &Path) -> Result<Table, GraderError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        GraderError::Configuration(format!("Could not read {}: {e}", path.display()))
    })?;
    Table::parse(&text)
        .map_err(|e| GraderError::Configuration(format!("Could not parse {}: {e}", path.display())))
}

/// Parses an allow-list out of CSV text with an `email_address` column.
pub fn parse_allowlist(text: &str) -> Result<Allowlist, GraderError> {
    let table = Table::parse(text).map_err(|e| GraderError::Configuration(e.to_string()))?;
    allowlist_from(&table)
}

/// Builds the allow-list out of a parsed roster.
fn allowlist_from(table: &Table) -> Result<Allowlist, GraderError> {
    let column = table.column(ALLOWLIST_COLUMN).ok_or_else(|| {
        GraderError::Configuration(format!("Roster must contain an `{ALLOWLIST_COLUMN}` column."))
    })?;
    Ok(Allowlist::new(table.values(column)))
}

/// Loads the allow-list from the roster at `path`.
pub fn load_allowlist(path: &Path) -> Result<Allowlist, GraderError> {
    let allowlist = allowlist_from(&read_table(path)?)?;
    if allowlist.is_empty() {
        tracing::warn!("Roster {} lists no addresses", path.display());
    }
    Ok(allowlist)
}

/// Parses the question and session out of CSV text. Only the first data row
/// is used.
pub fn parse_question(text: &str) -> Result<Question, GraderError> {
    let table = Table::parse(text).map_err(|e| GraderError::Configuration(e.to_string()))?;
    question_from(&table)
}

/// Reads the first row of a parsed question file.
fn question_from(table: &Table) -> Result<Question, GraderError> {
    let (Some(q), Some(s)) = (table.column(QUESTION_COLUMN), table.column(SESSION_COLUMN)) else {
        return Err(GraderError::Configuration(format!(
            "Columns `{QUESTION_COLUMN}` or `{SESSION_COLUMN}` not found in the question file."
        )));
    };

    let row = table
        .rows()
        .first()
        .ok_or_else(|| GraderError::Configuration("Question file has no rows.".into()))?;

    let cell = |i: usize| row.get(i).cloned().unwrap_or_default();
    Ok(Question {
        question: cell(q),
        session:  cell(s),
    })
}

/// Loads the question and session from the file at `path`.
pub fn load_question(path: &Path) -> Result<Question, GraderError> {
    question_from(&read_table(path)?)
}

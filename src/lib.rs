//! # mailgrader
//!
//! Grades homework submissions received by email: reads a mailbox, keeps
//! original messages from allow-listed senders, extracts their code
//! attachments, asks a language model to grade the ones sent for the current
//! session and stores every record in a document store.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Run configuration
pub mod config;
/// A module defining a bunch of constant values to be used throughout
pub mod constants;
/// Error taxonomy of a grading run
pub mod error;
/// Turns raw messages into submission records
pub mod extract;
/// Language-model grading
pub mod grading;
/// Mailbox access and sender allow-listing
pub mod mailbox;
/// For all parsers used
pub mod parsers;
/// The batch orchestrator
pub mod pipeline;
/// The persisted submission record
pub mod record;
/// Append-only CSV log of records
pub mod record_log;
/// Roster and question file readers
pub mod roster;
/// Result sinks
pub mod sink;
/// Run summary and stages
pub mod summary;

pub use error::GraderError;
pub use pipeline::Pipeline;
pub use record::SubmissionRecord;
pub use summary::{RunSummary, Stage};

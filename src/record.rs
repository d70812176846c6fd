#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::{constants::UNKNOWN, error::GraderError, parsers::parse_grade};

/// One submission extracted from an email, as it is persisted.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(on(String, into))]
pub struct SubmissionRecord {
    /// Identifier of the message within the mail source.
    pub message_id:       String,
    /// Display name from the `From` header, empty if there was none.
    #[builder(default)]
    pub sender_name:      String,
    /// Address from the `From` header.
    pub sender_address:   String,
    /// `YYYY-MM-DD` in the sender's offset, or `unknown`.
    #[builder(default = UNKNOWN.to_string())]
    pub received_date:    String,
    /// `HH:MM:SS` in the sender's offset, or `unknown`.
    #[builder(default = UNKNOWN.to_string())]
    pub received_time:    String,
    /// Decoded subject line.
    #[builder(default)]
    pub subject:          String,
    /// Number of attachments with the submission extension.
    #[builder(default)]
    pub attachment_count: usize,
    /// Contents of those attachments, each behind a file marker.
    #[builder(default)]
    pub submission_text:  String,
    /// Raw reply of the grading backend, only for graded records.
    #[serde(default)]
    pub grading_reply:    Option<String>,
    /// Grade parsed from `grading_reply`.
    #[serde(default)]
    pub grade:            Option<f64>,
}

impl SubmissionRecord {
    /// Stores the grading reply and derives the grade from it.
    ///
    /// The reply is kept even when no grade can be parsed out of it; the
    /// grade then stays absent and the parse error is returned.
    pub fn apply_reply(&mut self, reply: String) -> Result<f64, GraderError> {
        let parsed = parse_grade(&reply);
        self.grade = parsed.as_ref().ok().copied();
        self.grading_reply = Some(reply);
        parsed
    }

    /// Whether the record went through grading.
    pub fn is_graded(&self) -> bool {
        self.grading_reply.is_some()
    }

    /// Whether the subject names the given session.
    pub fn matches_session(&self, session: &str) -> bool {
        self.subject == session
    }
}

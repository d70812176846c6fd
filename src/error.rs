#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use thiserror::Error;

use crate::summary::Stage;

/// Errors raised while running a grading batch.
///
/// Only [`GraderError::Configuration`] and [`GraderError::Authentication`]
/// stop a run. Everything else is confined to the record (or, for
/// [`GraderError::Persistence`], the batch) it happened in and ends up in the
/// run summary.
#[derive(Debug, Error)]
pub enum GraderError {
    /// A required setting is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The mailbox could not be reached or rejected the credentials.
    #[error("Could not log in to `{host}` as `{user}`: {reason}")]
    Authentication {
        /// IMAP host that was contacted.
        host:   String,
        /// Account used to log in.
        user:   String,
        /// Error reported by the transport or the server.
        reason: String,
    },
    /// A message could not be parsed as MIME.
    #[error("Message `{message_id}` could not be parsed: {reason}")]
    MessageParse {
        /// Mail source identifier of the message.
        message_id: String,
        /// Parser error.
        reason:     String,
    },
    /// The grading backend failed to answer.
    #[error("Grading backend failed: {0}")]
    Backend(String),
    /// The grading reply did not carry a usable `<label:number>` token.
    #[error("Malformed grading reply: {0}")]
    MalformedReply(String),
    /// The document store rejected the batch.
    #[error("Could not persist results: {0}")]
    Persistence(String),
}

impl GraderError {
    /// Whether this error must stop the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Authentication { .. })
    }

    /// Stage of a run this kind of error is raised in.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Configuration(_) => Stage::Init,
            Self::Authentication { .. } => Stage::Fetching,
            Self::MessageParse { .. } => Stage::Extracting,
            Self::Backend(_) | Self::MalformedReply(_) => Stage::Grading,
            Self::Persistence(_) => Stage::Persisting,
        }
    }
}

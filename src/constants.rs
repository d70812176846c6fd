#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Default IMAP endpoint, reached over implicit TLS.
pub const DEFAULT_IMAP_HOST: &str = "imap.gmail.com";

/// Default implicit-TLS IMAP port.
pub const DEFAULT_IMAP_PORT: u16 = 993;

/// Mailbox scanned for submissions.
pub const DEFAULT_MAILBOX: &str = "INBOX";

/// File extension (without the dot) of attachments treated as submissions.
pub const DEFAULT_EXTENSION: &str = "py";

/// Chat model used for grading when nothing else is configured.
pub const DEFAULT_MODEL: &str = "gpt-4";

/// Sampling temperature used for grading when nothing else is configured.
/// Kept low so repeated grading of the same submission is reproducible.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Document collection the results are appended to.
pub const DEFAULT_COLLECTION: &str = "mails_info";

/// Path of the JSON prompt configuration.
pub const DEFAULT_PROMPT_CONFIG: &str = "config.json";

/// Placeholder for the date and time fields when the Date header is missing
/// or unparseable.
pub const UNKNOWN: &str = "unknown";

/// Roster column holding allow-listed sender addresses.
pub const ALLOWLIST_COLUMN: &str = "email_address";

/// Question file column holding the question text.
pub const QUESTION_COLUMN: &str = "question";

/// Question file column holding the session identifier.
pub const SESSION_COLUMN: &str = "session";

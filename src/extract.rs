#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Turns raw messages into [`SubmissionRecord`]s.

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use mailparse::{DispositionType, MailAddr, MailHeaderMap, ParsedMail};

use crate::{
    constants::{DEFAULT_EXTENSION, UNKNOWN},
    error::GraderError,
    mailbox::{RawMessage, normalize_sender},
    record::SubmissionRecord,
};

/// Headers whose presence marks a message as a reply or a forward.
const THREADING_HEADERS: [&str; 2] = ["In-Reply-To", "References"];

/// Extracts submission records from raw messages.
#[derive(Debug, Clone)]
pub struct SubmissionExtractor {
    /// Lower-cased extension, without the leading dot.
    extension: String,
}

impl Default for SubmissionExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSION)
    }
}

impl SubmissionExtractor {
    /// Creates an extractor for attachments ending in `extension`.
    /// A leading dot is optional and case is ignored.
    pub fn new(extension: &str) -> Self {
        Self {
            extension: extension.trim().trim_start_matches('.').to_lowercase(),
        }
    }

    /// Returns the extension matched, without the leading dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Builds a record out of `raw`, or returns `None` when the message is a
    /// reply or a forward.
    ///
    /// A broken Date header does not fail extraction; both date fields are
    /// set to `unknown` instead.
    pub fn extract(&self, raw: &RawMessage) -> Result<Option<SubmissionRecord>, GraderError> {
        let parsed =
            mailparse::parse_mail(&raw.body).map_err(|e| GraderError::MessageParse {
                message_id: raw.id.clone(),
                reason:     e.to_string(),
            })?;

        if is_threaded(&parsed) {
            tracing::debug!(message_id = %raw.id, "skipping reply or forward");
            return Ok(None);
        }

        let (sender_name, sender_address) =
            parse_sender(&parsed.headers.get_first_value("From").unwrap_or_default());

        let (received_date, received_time) = match parsed
            .headers
            .get_first_value("Date")
            .and_then(|value| parse_date(&value))
        {
            Some(date) => (
                date.format("%Y-%m-%d").to_string(),
                date.format("%H:%M:%S").to_string(),
            ),
            None => {
                tracing::warn!(message_id = %raw.id, "missing or unparseable Date header");
                (UNKNOWN.to_string(), UNKNOWN.to_string())
            }
        };

        let subject = parsed.headers.get_first_value("Subject").unwrap_or_default();

        let attachments = self.code_attachments(&parsed);
        let submission_text = attachments
            .iter()
            .map(|(name, content)| format!("# === File: {name} ===\n{}", content.trim()))
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(Some(
            SubmissionRecord::builder()
                .message_id(raw.id.clone())
                .sender_name(sender_name)
                .sender_address(sender_address)
                .received_date(received_date)
                .received_time(received_time)
                .subject(subject)
                .attachment_count(attachments.len())
                .submission_text(submission_text)
                .build(),
        ))
    }

    /// Collects `(filename, text)` for every attachment with the configured
    /// extension, in the order the parts appear in the message.
    fn code_attachments(&self, mail: &ParsedMail<'_>) -> Vec<(String, String)> {
        let mut parts = Vec::new();
        walk_parts(mail, &mut parts);

        parts
            .into_iter()
            .filter_map(|part| {
                let disposition = part.get_content_disposition();
                if !matches!(disposition.disposition, DispositionType::Attachment) {
                    return None;
                }

                let filename = disposition
                    .params
                    .get("filename")
                    .or_else(|| part.ctype.params.get("name"))?
                    .clone();
                if !self.matches(&filename) {
                    return None;
                }

                let bytes = match part.get_body_raw() {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!(%filename, "could not decode attachment body: {e}");
                        Vec::new()
                    }
                };

                Some((filename, decode_text(bytes)))
            })
            .collect()
    }

    /// Whether `filename` carries the configured extension.
    fn matches(&self, filename: &str) -> bool {
        filename
            .trim()
            .to_lowercase()
            .ends_with(&format!(".{}", self.extension))
    }
}

/// Pushes `part` and all of its descendants, depth-first.
fn walk_parts<'a>(part: &'a ParsedMail<'a>, out: &mut Vec<&'a ParsedMail<'a>>) {
    out.push(part);
    for sub in &part.subparts {
        walk_parts(sub, out);
    }
}

/// Whether the message carries a non-empty threading header.
fn is_threaded(mail: &ParsedMail<'_>) -> bool {
    THREADING_HEADERS.iter().any(|name| {
        mail.headers
            .get_first_value(name)
            .is_some_and(|value| !value.trim().is_empty())
    })
}

/// Splits a `From` header into display name and address.
pub fn parse_sender(from: &str) -> (String, String) {
    let first = mailparse::addrparse(from)
        .ok()
        .and_then(|list| {
            list.into_inner().into_iter().find_map(|addr| match addr {
                MailAddr::Single(single) => Some(single),
                MailAddr::Group(group) => group.addrs.into_iter().next(),
            })
        });

    match first {
        Some(single) => (single.display_name.unwrap_or_default(), single.addr),
        None => (String::new(), normalize_sender(from)),
    }
}

/// Parses a Date header, keeping the offset it was written in.
pub fn parse_date(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    DateTime::parse_from_rfc2822(value).ok().or_else(|| {
        let timestamp = mailparse::dateparse(value).ok()?;
        Utc.timestamp_opt(timestamp, 0)
            .single()
            .map(|utc| utc.fixed_offset())
    })
}

/// Decodes attachment bytes as UTF-8, falling back to Latin-1.
pub fn decode_text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|e| e.into_bytes().into_iter().map(char::from).collect())
}

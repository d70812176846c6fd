#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Mailbox access and sender allow-listing.

use std::{collections::HashSet, net::TcpStream};

use anyhow::Context;
use mailparse::MailHeaderMap;
use native_tls::TlsStream;

use crate::error::GraderError;

/// Authenticated IMAP session over implicit TLS.
type ImapSession = imap::Session<TlsStream<TcpStream>>;

/// A message as fetched from the mail source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Identifier of the message within the mail source.
    pub id:   String,
    /// Full RFC 822 bytes.
    pub body: Vec<u8>,
}

impl RawMessage {
    /// Creates a raw message.
    pub fn new(id: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            id:   id.into(),
            body: body.into(),
        }
    }

    /// Returns the normalized sender address, reading only the headers.
    pub fn sender(&self) -> String {
        let from = mailparse::parse_headers(&self.body)
            .ok()
            .and_then(|(headers, _)| headers.get_first_value("From"))
            .unwrap_or_default();
        normalize_sender(&from)
    }
}

/// Something that hands out raw messages, newest first.
///
/// The returned iterator is single-pass; a fresh listing needs a fresh
/// source.
pub trait MessageSource {
    /// Lists the messages in the source, fetching them lazily.
    fn raw_messages(&mut self) -> anyhow::Result<Box<dyn Iterator<Item = RawMessage> + '_>>;
}

impl MessageSource for Vec<RawMessage> {
    fn raw_messages(&mut self) -> anyhow::Result<Box<dyn Iterator<Item = RawMessage> + '_>> {
        Ok(Box::new(self.drain(..)))
    }
}

/// Sender addresses whose mail is processed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allowlist(HashSet<String>);

impl Allowlist {
    /// Builds an allow-list, trimming every entry and dropping empty ones.
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            addresses
                .into_iter()
                .map(|a| a.as_ref().trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
        )
    }

    /// Whether `address` is on the list. The comparison is exact.
    pub fn contains(&self, address: &str) -> bool {
        self.0.contains(address.trim())
    }

    /// Number of addresses on the list.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Reduces a `From` value to a bare address: the text between `<` and `>`
/// when both are present, trimmed.
pub fn normalize_sender(from: &str) -> String {
    from.split_once('<')
        .and_then(|(_, rest)| rest.split_once('>'))
        .map_or(from, |(address, _)| address)
        .trim()
        .to_string()
}

/// Lists the messages of `source` sent by an allow-listed address.
pub fn list_messages<'a, S: MessageSource>(
    source: &'a mut S,
    allowlist: &'a Allowlist,
) -> anyhow::Result<impl Iterator<Item = RawMessage> + 'a> {
    Ok(source.raw_messages()?.filter(move |message| {
        let sender = message.sender();
        let allowed = allowlist.contains(&sender);
        if !allowed {
            tracing::debug!(message_id = %message.id, %sender, "sender not on the allow-list");
        }
        allowed
    }))
}

/// An IMAP mailbox reached over implicit TLS.
///
/// The session is logged out when the value is dropped.
pub struct ImapMailbox {
    /// Live session, `None` only while being dropped.
    session: Option<ImapSession>,
    /// Folder that is listed.
    folder:  String,
}

impl ImapMailbox {
    /// Connects to `host:port` and logs in.
    pub fn open(
        host: &str,
        port: u16,
        address: &str,
        credential: &str,
        folder: &str,
    ) -> Result<Self, GraderError> {
        let auth_error = |reason: String| GraderError::Authentication {
            host: host.to_string(),
            user: address.to_string(),
            reason,
        };

        let tls = native_tls::TlsConnector::builder()
            .build()
            .map_err(|e| auth_error(format!("failed to build TLS connector: {e}")))?;

        let client = imap::connect((host, port), host, &tls)
            .map_err(|e| auth_error(format!("failed to connect to {host}:{port}: {e}")))?;

        let session = client
            .login(address, credential)
            .map_err(|(e, _)| auth_error(e.to_string()))?;

        tracing::info!("Logged in to {host} as {address}");
        Ok(Self {
            session: Some(session),
            folder:  folder.to_string(),
        })
    }
}

impl MessageSource for ImapMailbox {
    fn raw_messages(&mut self) -> anyhow::Result<Box<dyn Iterator<Item = RawMessage> + '_>> {
        let session = self
            .session
            .as_mut()
            .context("IMAP session is already closed")?;

        session
            .select(&self.folder)
            .with_context(|| format!("Could not select mailbox `{}`", self.folder))?;

        let mut ids: Vec<u32> = session
            .search("ALL")
            .context("Could not list messages")?
            .into_iter()
            .collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        tracing::info!("{} messages in {}", ids.len(), self.folder);

        Ok(Box::new(ids.into_iter().filter_map(move |seq| {
            let fetches = match session.fetch(seq.to_string(), "RFC822") {
                Ok(fetches) => fetches,
                Err(e) => {
                    tracing::warn!(seq, "failed to fetch message: {e}");
                    return None;
                }
            };

            let body = fetches.iter().find_map(|f| f.body().map(<[u8]>::to_vec));
            if body.is_none() {
                tracing::warn!(seq, "fetched message has no body");
            }
            body.map(|body| RawMessage::new(seq.to_string(), body))
        })))
    }
}

impl Drop for ImapMailbox {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take()
            && let Err(e) = session.logout()
        {
            tracing::debug!("IMAP logout failed: {e}");
        }
    }
}

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Run configuration, read once at startup from the environment and the
//! prompt file.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{
    constants::{
        DEFAULT_COLLECTION, DEFAULT_EXTENSION, DEFAULT_IMAP_HOST, DEFAULT_IMAP_PORT,
        DEFAULT_MAILBOX, DEFAULT_MODEL, DEFAULT_TEMPERATURE,
    },
    error::GraderError,
};

/// Contents of the JSON prompt configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PromptConfig {
    /// Instructions prepended to every grading request.
    pub prompt:      String,
    /// Chat model override.
    #[serde(default)]
    pub model:       Option<String>,
    /// Sampling temperature override.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Submission extension override.
    #[serde(default)]
    pub extension:   Option<String>,
}

impl PromptConfig {
    /// Parses the prompt configuration from JSON text.
    pub fn parse(text: &str) -> Result<Self, GraderError> {
        serde_json::from_str(text)
            .map_err(|e| GraderError::Configuration(format!("Invalid prompt configuration: {e}")))
    }

    /// Reads the prompt configuration at `path`.
    pub fn load(path: &Path) -> Result<Self, GraderError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            GraderError::Configuration(format!("Could not read {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }
}

/// Mailbox location and credentials.
#[derive(Clone)]
pub struct MailboxEnv {
    /// IMAP host.
    pub host:       String,
    /// IMAP port, implicit TLS.
    pub port:       u16,
    /// Folder scanned for submissions.
    pub folder:     String,
    /// Account address.
    pub address:    String,
    /// App-specific password.
    pub credential: String,
}

impl std::fmt::Debug for MailboxEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxEnv")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("folder", &self.folder)
            .field("address", &self.address)
            .field("credential", &"[REDACTED]")
            .finish()
    }
}

/// OpenAI-compatible grading backend settings.
#[derive(Clone)]
pub struct OpenAiEnv {
    /// Base URL, `None` for the library default.
    pub api_base:    Option<String>,
    /// API key.
    pub api_key:     String,
    /// Chat model.
    pub model:       String,
    /// Sampling temperature.
    pub temperature: f32,
}

impl std::fmt::Debug for OpenAiEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEnv")
            .field("api_base", &self.api_base)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// PostgREST document store settings.
#[derive(Clone)]
pub struct StoreEnv {
    /// Fully qualified PostgREST endpoint.
    pub rest_endpoint: String,
    /// API key sent with every request.
    pub api_key:       String,
    /// Table the records are appended to.
    pub collection:    String,
}

impl StoreEnv {
    /// Builds store settings from a Supabase project URL.
    pub fn new(url: &str, key: String, collection: String) -> Self {
        Self {
            rest_endpoint: format!("{}/rest/v1", url.trim_end_matches('/')),
            api_key: key,
            collection,
        }
    }
}

impl std::fmt::Debug for StoreEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreEnv")
            .field("rest_endpoint", &self.rest_endpoint)
            .field("api_key", &"[REDACTED]")
            .field("collection", &self.collection)
            .finish()
    }
}

/// Everything one grading run needs.
#[derive(Debug, Clone)]
pub struct Config {
    /// Mailbox to read.
    pub mailbox:       MailboxEnv,
    /// Grading backend.
    pub openai:        OpenAiEnv,
    /// Document store, absent on dry runs.
    pub store:         Option<StoreEnv>,
    /// CSV roster of allowed senders.
    pub roster_path:   PathBuf,
    /// CSV holding the question and session.
    pub question_path: PathBuf,
    /// Grading instructions.
    pub prompt:        String,
    /// Extension of submission attachments.
    pub extension:     String,
    /// Optional append-only CSV log of extracted records.
    pub record_log:    Option<PathBuf>,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// `require_store` is false on dry runs, where nothing is persisted.
    pub fn from_env(prompt: PromptConfig, require_store: bool) -> Result<Self, GraderError> {
        Self::from_lookup(|name| std::env::var(name).ok(), prompt, require_store)
    }

    /// Reads the configuration through `lookup`, which maps variable names to
    /// values.
    ///
    /// Every missing required variable is reported at once.
    pub fn from_lookup<F>(
        lookup: F,
        prompt: PromptConfig,
        require_store: bool,
    ) -> Result<Self, GraderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        let mut missing = Vec::new();
        let mut required = |name: &'static str| {
            get(name).unwrap_or_else(|| {
                missing.push(name);
                String::new()
            })
        };

        let address = required("MAIL_TO_CHECK");
        let credential = required("APP_PASSWORD");
        let roster_path = required("MAILS_FILE_PATH");
        let question_path = required("QUESTION_FILE_PATH");
        let api_key = required("OPENAI_API_KEY");
        let store = if require_store {
            Some((required("SUPABASE_URL"), required("SUPABASE_ANON_KEY")))
        } else {
            None
        };

        if !missing.is_empty() {
            return Err(GraderError::Configuration(format!(
                "Missing environment variables: {}",
                missing.join(", ")
            )));
        }

        let port = match get("IMAP_PORT") {
            Some(port) => port.parse::<u16>().map_err(|_| {
                GraderError::Configuration(format!("IMAP_PORT is not a valid port: {port}"))
            })?,
            None => DEFAULT_IMAP_PORT,
        };

        let temperature = match prompt.temperature {
            Some(t) => t,
            None => match get("OPENAI_TEMPERATURE") {
                Some(t) => t.parse::<f32>().map_err(|_| {
                    GraderError::Configuration(format!("OPENAI_TEMPERATURE is not a number: {t}"))
                })?,
                None => DEFAULT_TEMPERATURE,
            },
        };

        let collection =
            get("RESULTS_COLLECTION").unwrap_or_else(|| DEFAULT_COLLECTION.to_string());

        Ok(Self {
            mailbox: MailboxEnv {
                host: get("IMAP_HOST").unwrap_or_else(|| DEFAULT_IMAP_HOST.to_string()),
                port,
                folder: get("IMAP_MAILBOX").unwrap_or_else(|| DEFAULT_MAILBOX.to_string()),
                address,
                credential,
            },
            openai: OpenAiEnv {
                api_base: get("OPENAI_ENDPOINT"),
                api_key,
                model: prompt
                    .model
                    .clone()
                    .or_else(|| get("OPENAI_MODEL"))
                    .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                temperature,
            },
            store: store.map(|(url, key)| StoreEnv::new(&url, key, collection)),
            roster_path: PathBuf::from(roster_path),
            question_path: PathBuf::from(question_path),
            extension: prompt
                .extension
                .clone()
                .unwrap_or_else(|| DEFAULT_EXTENSION.to_string()),
            prompt: prompt.prompt,
            record_log: get("MAILS_INFO_FILE_PATH").map(PathBuf::from),
        })
    }

    /// Overrides the submission extension.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Overrides the record log location.
    pub fn with_record_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.record_log = Some(path.into());
        self
    }
}

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Language-model grading of submissions.

use std::future::Future;

use anyhow::{Context, Result};
use async_openai::{
    Client as OpenAIClient,
    config::OpenAIConfig,
    types::chat::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs},
};
use reqwest::Client;

use crate::{config::OpenAiEnv, error::GraderError};

/// A text-generation service that answers a single instruction.
pub trait GradingBackend {
    /// Sends `instruction` and returns the reply text.
    fn complete(&self, instruction: String) -> impl Future<Output = Result<String>>;
}

/// Chat-completion backend for OpenAI-compatible APIs.
pub struct OpenAiBackend {
    /// API client.
    client:      OpenAIClient<OpenAIConfig>,
    /// Chat model.
    model:       String,
    /// Sampling temperature.
    temperature: f32,
}

impl OpenAiBackend {
    /// Creates a backend from the configured credentials.
    pub fn new(env: &OpenAiEnv) -> Result<Self> {
        let mut config = OpenAIConfig::new().with_api_key(&env.api_key);
        if let Some(base) = &env.api_base {
            config = config.with_api_base(base);
        }

        let http_client = Client::builder()
            // Avoid macOS dynamic store lookups that fail in sandboxed environments.
            .no_proxy()
            .build()
            .context("Failed to construct HTTP client for the grading backend")?;

        Ok(Self {
            client:      OpenAIClient::with_config(config).with_http_client(http_client),
            model:       env.model.clone(),
            temperature: env.temperature,
        })
    }
}

impl GradingBackend for OpenAiBackend {
    async fn complete(&self, instruction: String) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![
                ChatCompletionRequestUserMessageArgs::default()
                    .content(instruction)
                    .build()?
                    .into(),
            ])
            .temperature(self.temperature)
            .build()?;

        let response = self.client.chat().create(request).await?;

        Ok(response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

/// Joins prompt, question and submission into one instruction, in that order.
pub fn build_instruction(prompt: &str, question: &str, submission_text: &str) -> String {
    format!("{prompt} {question} {submission_text}")
}

/// Grades submissions through a [`GradingBackend`], one request each.
pub struct GradingClient<B> {
    /// Backend that answers the requests.
    backend: B,
}

impl<B: GradingBackend> GradingClient<B> {
    /// Wraps `backend`.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Asks the backend to grade `submission_text`.
    pub async fn try_grade(
        &self,
        question: &str,
        submission_text: &str,
        prompt: &str,
    ) -> Result<String, GraderError> {
        self.backend
            .complete(build_instruction(prompt, question, submission_text))
            .await
            .map_err(|e| GraderError::Backend(format!("{e:#}")))
    }

    /// Like [`GradingClient::try_grade`], but never fails: a backend error is
    /// logged, handed to `on_failure` and turned into an empty reply. Nothing
    /// is retried.
    pub async fn grade<F>(
        &self,
        question: &str,
        submission_text: &str,
        prompt: &str,
        on_failure: F,
    ) -> String
    where
        F: FnOnce(&GraderError),
    {
        match self.try_grade(question, submission_text, prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("{e}");
                on_failure(&e);
                String::new()
            }
        }
    }
}

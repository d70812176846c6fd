#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! One batch pass over the mailbox: fetch, extract, filter, grade, persist.

use bon::Builder;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    extract::SubmissionExtractor,
    grading::{GradingBackend, GradingClient},
    mailbox::{Allowlist, MessageSource, list_messages},
    record::SubmissionRecord,
    record_log::RecordLog,
    roster::Question,
    sink::ResultSink,
    summary::{RunSummary, Stage},
};

/// Everything a run needs besides the mailbox itself.
#[derive(Builder)]
#[builder(on(String, into))]
pub struct Pipeline<B, K> {
    /// Turns messages into records.
    #[builder(default)]
    extractor:  SubmissionExtractor,
    /// Grades records whose subject names the session.
    grader:     GradingClient<B>,
    /// Receives the whole batch at the end.
    sink:       K,
    /// Question sent along with every submission.
    question:   Question,
    /// Grading instructions.
    prompt:     String,
    /// Optional CSV log every extracted record is appended to.
    record_log: Option<RecordLog>,
}

impl<B: GradingBackend, K: ResultSink> Pipeline<B, K> {
    /// Returns the sink records are handed to.
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Processes every allow-listed message of `source`, one at a time, then
    /// persists all records in one batch.
    ///
    /// Per-record problems are collected in the returned summary and never
    /// stop the run; a failing sink is reported the same way.
    pub async fn run<S: MessageSource>(&self, source: &mut S, allowlist: &Allowlist) -> RunSummary {
        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("run", run_id = %run_id);
        self.run_inner(run_id, source, allowlist)
            .instrument(span)
            .await
    }

    /// Body of [`Pipeline::run`], executed inside the run's span.
    async fn run_inner<S: MessageSource>(
        &self,
        run_id: String,
        source: &mut S,
        allowlist: &Allowlist,
    ) -> RunSummary {
        let mut summary = RunSummary {
            run_id,
            ..Default::default()
        };
        let mut records = Vec::new();

        tracing::debug!(stage = %Stage::Fetching);
        match list_messages(source, allowlist) {
            Ok(messages) => {
                for raw in messages {
                    summary.fetched += 1;

                    let record = match self.extractor.extract(&raw) {
                        Ok(Some(record)) => record,
                        Ok(None) => {
                            summary.excluded += 1;
                            continue;
                        }
                        Err(e) => {
                            summary.fail(&raw.id, e.stage(), e);
                            continue;
                        }
                    };
                    summary.extracted += 1;

                    let record = self.grade_if_matching(record, &mut summary).await;

                    if let Some(log) = &self.record_log
                        && let Err(e) = log.append(&record)
                    {
                        tracing::warn!(
                            message_id = %record.message_id,
                            "could not append to {}: {e:#}",
                            log.path().display()
                        );
                    }

                    records.push(record);
                }
            }
            Err(e) => summary.fail("*", Stage::Fetching, format!("{e:#}")),
        }

        tracing::debug!(stage = %Stage::Persisting);
        if records.is_empty() {
            tracing::info!("No records to persist");
        } else {
            match self.sink.persist(records).await {
                Ok(count) => summary.persisted = count,
                Err(e) => {
                    tracing::error!("{e}");
                    summary.persistence_error = Some(e.to_string());
                }
            }
        }

        tracing::debug!(stage = %Stage::Done);
        summary
    }

    /// Grades `record` if its subject names the session; other records pass
    /// through untouched.
    async fn grade_if_matching(
        &self,
        mut record: SubmissionRecord,
        summary: &mut RunSummary,
    ) -> SubmissionRecord {
        if !record.matches_session(&self.question.session) {
            tracing::debug!(
                message_id = %record.message_id,
                stage = %Stage::Filtering,
                subject = %record.subject,
                "subject does not match the session"
            );
            return record;
        }
        summary.matched += 1;

        let mut backend_failed = false;
        let reply = self
            .grader
            .grade(
                &self.question.question,
                &record.submission_text,
                &self.prompt,
                |e| {
                    backend_failed = true;
                    summary.fail(&record.message_id, e.stage(), e);
                },
            )
            .await;

        match record.apply_reply(reply) {
            Ok(grade) => {
                summary.graded += 1;
                tracing::info!(
                    message_id = %record.message_id,
                    sender = %record.sender_address,
                    "graded {grade}"
                );
            }
            Err(e) if !backend_failed => summary.fail(&record.message_id, e.stage(), e),
            Err(_) => {}
        }

        record
    }
}

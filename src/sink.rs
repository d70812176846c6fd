#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Destinations for the records of a run.

use std::{
    future::Future,
    io::{self, Write},
};

use postgrest::Postgrest;

use crate::{config::StoreEnv, error::GraderError, record::SubmissionRecord};

/// Persists a whole batch of records in one call.
pub trait ResultSink {
    /// Stores `records` and returns how many were stored.
    fn persist(
        &self,
        records: Vec<SubmissionRecord>,
    ) -> impl Future<Output = Result<usize, GraderError>>;
}

/// Appends records to a PostgREST table, one document per record.
pub struct PostgrestSink {
    /// PostgREST client.
    client:     Postgrest,
    /// Target table.
    collection: String,
}

impl PostgrestSink {
    /// Creates a sink for the configured store.
    pub fn new(store: &StoreEnv) -> Self {
        Self {
            client:     Postgrest::new(store.rest_endpoint.clone())
                .insert_header("apikey", store.api_key.clone())
                .insert_header("authorization", format!("Bearer {}", store.api_key)),
            collection: store.collection.clone(),
        }
    }
}

impl ResultSink for PostgrestSink {
    async fn persist(&self, records: Vec<SubmissionRecord>) -> Result<usize, GraderError> {
        let count = records.len();
        let body = batch_body(&records)?;

        let response = self
            .client
            .from(&self.collection)
            .insert(body)
            .execute()
            .await
            .map_err(|e| GraderError::Persistence(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GraderError::Persistence(format!(
                "`{}` answered {status}: {detail}",
                self.collection
            )));
        }

        tracing::info!("Inserted {count} documents into {}", self.collection);
        Ok(count)
    }
}

/// Serializes `records` as the JSON array sent in a bulk insert.
///
/// Every object of a PostgREST bulk insert must carry the same keys, so
/// absent values are written as `null`.
pub fn batch_body(records: &[SubmissionRecord]) -> Result<String, GraderError> {
    serde_json::to_string(records)
        .map_err(|e| GraderError::Persistence(format!("could not serialize records: {e}")))
}

/// Writes each record as one line of JSON to standard output.
#[derive(Debug, Default)]
pub struct JsonLinesSink;

impl ResultSink for JsonLinesSink {
    async fn persist(&self, records: Vec<SubmissionRecord>) -> Result<usize, GraderError> {
        let mut out = io::stdout().lock();
        for record in &records {
            let line = serde_json::to_string(record)
                .map_err(|e| GraderError::Persistence(e.to_string()))?;
            writeln!(out, "{line}").map_err(|e| GraderError::Persistence(e.to_string()))?;
        }
        Ok(records.len())
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::redpanda::{PublishError, RedpandaClient};
use crate::ingest::IngestError;
use crate::utils::{retry_with_backoff, CircuitState, RetryConfig};

/// Envelope written to the dead-letter topic.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetterRecord {
    /// Original bytes, lossily decoded so malformed payloads survive
    pub payload: String,
    pub stage: &'static str,
    pub reason: &'static str,
    pub error: String,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    pub fn new(payload: &[u8], error: &IngestError, topic: &str, partition: i32, offset: i64) -> Self {
        Self {
            payload: String::from_utf8_lossy(payload).into_owned(),
            stage: error.abandoned_at().as_str(),
            reason: error.reason(),
            error: error.to_string(),
            topic: topic.to_string(),
            partition,
            offset,
            failed_at: Utc::now(),
        }
    }

    /// Source coordinates; stable across redeliveries of the same message.
    pub fn key(&self) -> String {
        format!("{}-{}-{}", self.topic, self.partition, self.offset)
    }
}

pub struct DeadLetterPublisher {
    client: RedpandaClient,
    topic: String,
    retry: RetryConfig,
}

impl DeadLetterPublisher {
    pub fn new(client: RedpandaClient, topic: impl Into<String>) -> Self {
        Self {
            client,
            topic: topic.into(),
            retry: RetryConfig::default(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn publish(&self, record: &DeadLetterRecord) -> Result<(), PublishError> {
        let bytes = serde_json::to_vec(record)?;
        let key = record.key();

        let client = &self.client;
        let topic = self.topic.as_str();
        let key_ref = key.as_str();
        let payload = bytes.as_slice();

        retry_with_backoff(self.retry.clone(), move |_attempt| {
            client.publish(topic, key_ref, payload)
        })
        .await
        .into_result()?;

        tracing::warn!(
            dead_letter_topic = %self.topic,
            key = %key,
            reason = record.reason,
            "Message moved to dead-letter topic"
        );
        Ok(())
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.client.circuit_state().await
    }
}

use actix::Addr;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::util::Timeout;
use rdkafka::Offset;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;

use super::dead_letter::{DeadLetterPublisher, DeadLetterRecord};
use super::policy::{Disposition, FailurePolicy};
use crate::actors::{component, HealthMonitorActor, HealthStatus, UpdateHealth};
use crate::config::Config;
use crate::ingest::{IngestError, IngestPipeline, Processed};
use crate::metrics::Metrics;

// ============================================================================
// Order Subscriber - durable consumer on the orders topic
// ============================================================================
//
// The consumer group's committed offsets are the durable subscription: a
// restarted service resumes after the last committed message. Offsets are
// committed by hand once the FailurePolicy has decided what to do with a
// message, so nothing is acknowledged before it has been handled.
//
// Messages are taken one at a time. Shutdown is checked between messages and
// never interrupts one in flight.
//
// ============================================================================

const SEEK_TIMEOUT: Duration = Duration::from_secs(5);
const RECV_BACKOFF: Duration = Duration::from_secs(1);

/// Bus-side step for one delivery.
#[derive(Debug)]
enum Step<'a, E, P> {
    Commit,
    Rewind,
    /// Dead-lettering wanted but no publisher is configured
    Unparked,
    DeadLetter { error: &'a E, publisher: &'a P },
}

fn plan<'a, E, P>(
    disposition: Disposition,
    error: Option<&'a E>,
    publisher: Option<&'a P>,
) -> Step<'a, E, P> {
    match (disposition, error, publisher) {
        (Disposition::Commit, _, _) => Step::Commit,
        (Disposition::Redeliver, _, _) => Step::Rewind,
        (Disposition::DeadLetter, None, _) => Step::Commit,
        (Disposition::DeadLetter, Some(_), None) => Step::Unparked,
        (Disposition::DeadLetter, Some(error), Some(publisher)) => {
            Step::DeadLetter { error, publisher }
        }
    }
}

/// A message is only acknowledged once its dead-letter record is written.
fn after_dead_letter(published: bool) -> Disposition {
    if published {
        Disposition::Commit
    } else {
        Disposition::Redeliver
    }
}

pub struct OrderSubscriber {
    consumer: StreamConsumer,
    pipeline: Arc<IngestPipeline>,
    policy: FailurePolicy,
    dead_letter: Option<Arc<DeadLetterPublisher>>,
    redelivery_delay: Duration,
    metrics: Arc<Metrics>,
    health: Addr<HealthMonitorActor>,
}

impl OrderSubscriber {
    pub fn new(
        config: &Config,
        pipeline: Arc<IngestPipeline>,
        dead_letter: Option<Arc<DeadLetterPublisher>>,
        metrics: Arc<Metrics>,
        health: Addr<HealthMonitorActor>,
    ) -> Result<Self, KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.kafka_brokers)
            .set("group.id", &config.consumer_group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "6000")
            .create()?;

        consumer.subscribe(&[config.orders_topic.as_str()])?;

        tracing::info!(
            topic = %config.orders_topic,
            group = %config.consumer_group,
            policy = %config.failure_policy,
            "Subscribed to orders topic"
        );

        Ok(Self {
            consumer,
            pipeline,
            policy: config.failure_policy,
            dead_letter,
            redelivery_delay: config.redelivery_delay,
            metrics,
            health,
        })
    }

    /// Consume until `shutdown` flips to true or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        self.report(component::SUBSCRIBER, HealthStatus::Healthy);
        let mut receiving = true;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = self.consumer.recv() => match received {
                    Ok(message) => {
                        if !receiving {
                            receiving = true;
                            self.report(component::SUBSCRIBER, HealthStatus::Healthy);
                        }
                        self.handle(&message).await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to receive from bus");
                        if receiving {
                            receiving = false;
                            self.report(
                                component::SUBSCRIBER,
                                HealthStatus::Degraded(format!("receive failed: {e}")),
                            );
                        }
                        tokio::time::sleep(RECV_BACKOFF).await;
                    }
                },
            }
        }

        tracing::info!("Order subscriber stopped");
    }

    async fn handle(&self, message: &BorrowedMessage<'_>) {
        let delivery_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "delivery",
            %delivery_id,
            topic = message.topic(),
            partition = message.partition(),
            offset = message.offset(),
        );

        async {
            let payload = message.payload().unwrap_or_default();
            let outcome = self.pipeline.process(payload).await;
            self.report_store(&outcome);

            let disposition = self.policy.disposition(&outcome);
            match plan(disposition, outcome.as_ref().err(), self.dead_letter.as_deref()) {
                Step::Commit => self.commit(message),
                Step::Rewind => self.rewind(message).await,
                Step::Unparked => {
                    tracing::error!("No dead-letter publisher configured, dropping message");
                    self.commit(message);
                }
                Step::DeadLetter { error, publisher } => {
                    let published = self.dead_letter(publisher, message, payload, error).await;
                    match after_dead_letter(published) {
                        Disposition::Redeliver => self.rewind(message).await,
                        _ => self.commit(message),
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    fn commit(&self, message: &BorrowedMessage<'_>) {
        if let Err(e) = self.consumer.commit_message(message, CommitMode::Async) {
            tracing::warn!(error = %e, "Failed to commit offset");
        }
    }

    /// Move the partition back to `message` so the bus hands it out again.
    async fn rewind(&self, message: &BorrowedMessage<'_>) {
        tokio::time::sleep(self.redelivery_delay).await;

        match self.consumer.seek(
            message.topic(),
            message.partition(),
            Offset::Offset(message.offset()),
            Timeout::After(SEEK_TIMEOUT),
        ) {
            Ok(()) => {
                self.metrics.record_redelivery();
                tracing::info!("Message left unacknowledged for redelivery");
            }
            Err(e) => {
                // The uncommitted offset still brings it back after a rebalance.
                tracing::error!(error = %e, "Failed to rewind partition");
            }
        }
    }

    /// Publish `error`'s record; true once it is safely on the dead-letter topic.
    async fn dead_letter(
        &self,
        publisher: &DeadLetterPublisher,
        message: &BorrowedMessage<'_>,
        payload: &[u8],
        error: &IngestError,
    ) -> bool {
        let record = DeadLetterRecord::new(
            payload,
            error,
            message.topic(),
            message.partition(),
            message.offset(),
        );

        match publisher.publish(&record).await {
            Ok(()) => {
                self.metrics.record_dead_letter(record.reason);
                self.report(component::DEAD_LETTER, HealthStatus::Healthy);
                true
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    dead_letter_topic = %publisher.topic(),
                    "Dead-letter publication failed, message stays unacknowledged"
                );
                self.report(
                    component::DEAD_LETTER,
                    HealthStatus::Unhealthy(format!("publish failed: {e}")),
                );
                false
            }
        }
    }

    fn report_store(&self, outcome: &Result<Processed, IngestError>) {
        match outcome {
            Ok(_) => self.report(component::STORE, HealthStatus::Healthy),
            Err(IngestError::Store { source, .. }) => self.report(
                component::STORE,
                HealthStatus::Degraded(format!("write failed: {source}")),
            ),
            Err(_) => {}
        }
    }

    fn report(&self, component: &str, status: HealthStatus) {
        self.health.do_send(UpdateHealth::new(component, status));
    }
}

use std::sync::Arc;

use common_kafka::kafka_consumer::{RecvErr, SingleTopicConsumer};
use health::HealthHandle;
use tracing::{debug, error, warn};

use crate::error_reporter::ErrorReporter;
use crate::metrics_consts::{
    EMPTY_EVENTS, ERROR_EVENTS_DROPPED, EVENTS_FAILED, EVENTS_PERSISTED, EVENTS_RECEIVED,
};
use crate::raw_event::RawEvent;
use crate::store::RecordStore;
use crate::types::{ErrorRecord, ErrorType, FailureDescriptor, HttpRecord, MethodRecord, Record};
use crate::validation::{validate_http_event, validate_method_event};

/// Which pipeline a subscribed topic feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    Method,
    Http,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuditKind {
    Method,
    Http,
}

/// Terminal outcome of one message. Whatever the outcome, the caller
/// commits the offset afterwards: the stream always advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A canonical record was written to the store
    Persisted,
    /// A stage failed; the failure went to the error channel
    Reported(ErrorType),
    /// An error-topic message could not be handled; logged only
    Dropped,
}

struct StageFailure {
    error_type: ErrorType,
    message: String,
}

impl StageFailure {
    fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
        }
    }
}

/// The per-message ingestion state machine.
///
/// Method and HTTP messages run parse → validate → build → persist as
/// straight-line stages with early exit; the first failing stage is
/// classified, turned into a failure descriptor, and reported on the error
/// channel. Nothing propagates out of `handle_message`, and acknowledgment
/// is never skipped: a poisoned message moves to the side channel for
/// inspection and replay instead of blocking its partition.
pub struct Handler {
    store: Arc<dyn RecordStore>,
    reporter: Arc<dyn ErrorReporter>,
}

impl Handler {
    pub fn new(store: Arc<dyn RecordStore>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { store, reporter }
    }

    pub async fn handle_message(
        &self,
        kind: TopicKind,
        topic: &str,
        key: Option<&str>,
        payload: &str,
    ) -> Disposition {
        debug!("Received message from topic: {}, key: {:?}", topic, key);
        metrics::counter!(EVENTS_RECEIVED, "topic" => topic.to_string()).increment(1);

        let disposition = match kind {
            TopicKind::Method => self.handle_audit_event(AuditKind::Method, topic, key, payload).await,
            TopicKind::Http => self.handle_audit_event(AuditKind::Http, topic, key, payload).await,
            TopicKind::Error => self.handle_error_event(payload).await,
        };

        match disposition {
            Disposition::Persisted => {
                metrics::counter!(EVENTS_PERSISTED, "topic" => topic.to_string()).increment(1)
            }
            Disposition::Reported(error_type) => {
                metrics::counter!(EVENTS_FAILED, "error_type" => error_type.as_str()).increment(1)
            }
            Disposition::Dropped => metrics::counter!(ERROR_EVENTS_DROPPED).increment(1),
        }
        disposition
    }

    async fn handle_audit_event(
        &self,
        kind: AuditKind,
        topic: &str,
        key: Option<&str>,
        payload: &str,
    ) -> Disposition {
        match self.process_audit_event(kind, key, payload).await {
            Ok(record) => {
                debug!("Successfully persisted record: {}", record.id());
                Disposition::Persisted
            }
            Err(failure) => {
                let descriptor = FailureDescriptor {
                    error_type: failure.error_type,
                    error_message: failure.message,
                    original_topic: topic.to_owned(),
                    original_message: payload.to_owned(),
                };
                warn!(
                    "Failed to process message from {}: {}: {}",
                    topic, descriptor.error_type, descriptor.error_message
                );
                self.reporter.report(&descriptor).await;
                Disposition::Reported(descriptor.error_type)
            }
        }
    }

    async fn process_audit_event(
        &self,
        kind: AuditKind,
        key: Option<&str>,
        payload: &str,
    ) -> Result<Record, StageFailure> {
        let event = RawEvent::parse(payload)
            .map_err(|e| StageFailure::new(ErrorType::ParsingError, e.to_string()))?;

        let record = match kind {
            AuditKind::Method => {
                if !validate_method_event(&event) {
                    return Err(StageFailure::new(
                        ErrorType::ValidationError,
                        "Required fields missing",
                    ));
                }
                MethodRecord::from_event(&event).map(Record::Method)
            }
            AuditKind::Http => {
                if !validate_http_event(&event) {
                    return Err(StageFailure::new(
                        ErrorType::ValidationError,
                        "Required fields missing",
                    ));
                }
                HttpRecord::from_event(&event, key).map(Record::Http)
            }
        }
        .map_err(|e| StageFailure::new(ErrorType::ProcessingError, e.to_string()))?;

        self.store
            .upsert(&record)
            .await
            .map_err(|e| StageFailure::new(ErrorType::IndexingError, e.to_string()))?;

        Ok(record)
    }

    /// Error-topic messages are already failure reports. Failures here are
    /// logged, never republished, so a poisoned error message terminates
    /// instead of circling the channel forever.
    async fn handle_error_event(&self, payload: &str) -> Disposition {
        let record = match RawEvent::parse(payload) {
            Ok(event) => ErrorRecord::from_event(&event),
            Err(e) => {
                error!("Failed to parse error event: {}", e);
                return Disposition::Dropped;
            }
        };

        match self.store.upsert(&Record::Error(record)).await {
            Ok(()) => {
                debug!("Successfully persisted error record");
                Disposition::Persisted
            }
            Err(e) => {
                error!("Failed to persist error event: {}", e);
                Disposition::Dropped
            }
        }
    }
}

/// One loop per subscribed topic. Each message is fully handled, then its
/// offset is committed, before the next is received: strict in-partition
/// ordering, one in-flight message per partition worker.
pub async fn run_consumer_loop(
    consumer: SingleTopicConsumer,
    handler: Arc<Handler>,
    kind: TopicKind,
    liveness: HealthHandle,
) {
    // Shorter than the liveness deadline, so an idle topic still reports
    // healthy between messages.
    const RECV_WAIT: std::time::Duration = std::time::Duration::from_secs(30);

    loop {
        liveness.report_healthy();

        let received = match tokio::time::timeout(RECV_WAIT, consumer.recv()).await {
            Ok(r) => r,
            Err(_) => continue, // idle topic
        };

        let message = match received {
            Ok(m) => m,
            Err(RecvErr::Empty) => {
                warn!("Received empty message");
                metrics::counter!(EMPTY_EVENTS).increment(1);
                continue;
            }
            Err(RecvErr::Kafka(e)) => {
                panic!("Kafka error: {:?}", e); // We just panic if we fail to recv from kafka, if it's down, we're down
            }
        };

        handler
            .handle_message(kind, &message.topic, message.key.as_deref(), &message.payload)
            .await;

        // Committing is the final step on every path, success or handled
        // failure. Panicking on commit failure, same reasoning as the recv
        // panic above: if kafka's down, we're down.
        message.offset.commit().expect("Failed to commit offset");
    }
}

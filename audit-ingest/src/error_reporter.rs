use std::sync::Mutex;

use async_trait::async_trait;
use common_kafka::kafka_producer::{send_keyed_json_to_kafka, KafkaContext};
use rdkafka::producer::FutureProducer;
use tracing::{debug, error};

use crate::types::{ErrorRecord, FailureDescriptor};

/// The error channel seam. Reporting is best-effort by contract: this is
/// the last line of failure handling, so implementations log publish
/// failures and swallow them rather than propagate.
#[async_trait]
pub trait ErrorReporter: Send + Sync {
    async fn report(&self, failure: &FailureDescriptor);
}

pub struct KafkaErrorReporter {
    producer: FutureProducer<KafkaContext>,
    topic: String,
}

impl KafkaErrorReporter {
    pub fn new(producer: FutureProducer<KafkaContext>, topic: String) -> Self {
        Self { producer, topic }
    }
}

pub(crate) fn error_key(record: &ErrorRecord) -> String {
    format!("error_{}", record.id)
}

#[async_trait]
impl ErrorReporter for KafkaErrorReporter {
    async fn report(&self, failure: &FailureDescriptor) {
        let record = ErrorRecord::from_failure(failure);
        let key = error_key(&record);

        match send_keyed_json_to_kafka(&self.producer, &self.topic, &key, &record).await {
            Ok(()) => debug!("Error sent to Kafka: {}", failure.error_type),
            Err(e) => error!(
                "Failed to send error to Kafka: {}: {:?}",
                failure.error_message, e
            ),
        }
    }
}

/// Captures descriptors instead of publishing them; for tests.
#[derive(Default)]
pub struct MemoryReporter {
    reported: Mutex<Vec<FailureDescriptor>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reported(&self) -> Vec<FailureDescriptor> {
        self.reported.lock().unwrap().clone()
    }
}

#[async_trait]
impl ErrorReporter for MemoryReporter {
    async fn report(&self, failure: &FailureDescriptor) {
        self.reported.lock().unwrap().push(failure.clone());
    }
}

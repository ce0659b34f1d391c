use std::sync::{Arc, Weak};

use rdkafka::{
    consumer::{CommitMode, Consumer, StreamConsumer},
    error::KafkaError,
    ClientConfig, Message, TopicPartitionList,
};

use crate::config::{ConsumerConfig, KafkaConfig};

/// A consumer subscribed to a single topic, with manual offset commits.
///
/// Messages are handed out raw: the callers of this crate need the original
/// payload text for error reporting and the message key for correlation, so
/// decoding happens on their side of the seam.
#[derive(Clone)]
pub struct SingleTopicConsumer {
    inner: Arc<Inner>,
}

struct Inner {
    consumer: StreamConsumer,
    topic: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RecvErr {
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("Received empty payload")]
    Empty,
}

#[derive(Debug, thiserror::Error)]
pub enum OffsetErr {
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("Consumer gone")]
    Gone,
}

/// One message received from the subscribed topic, along with the handle
/// used to acknowledge it.
pub struct ReceivedMessage {
    pub topic: String,
    pub key: Option<String>,
    pub payload: String,
    pub offset: Offset,
}

impl SingleTopicConsumer {
    pub fn new(
        common_config: &KafkaConfig,
        consumer_config: &ConsumerConfig,
        topic: &str,
    ) -> Result<Self, KafkaError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &common_config.kafka_hosts)
            .set("statistics.interval.ms", "10000")
            .set("group.id", &consumer_config.kafka_consumer_group)
            .set(
                "auto.offset.reset",
                &consumer_config.kafka_consumer_offset_reset,
            )
            .set(
                "isolation.level",
                &consumer_config.kafka_consumer_isolation_level,
            )
            .set(
                "session.timeout.ms",
                consumer_config.kafka_consumer_session_timeout_ms.to_string(),
            )
            .set(
                "heartbeat.interval.ms",
                consumer_config
                    .kafka_consumer_heartbeat_interval_ms
                    .to_string(),
            )
            .set(
                "max.poll.interval.ms",
                consumer_config
                    .kafka_consumer_max_poll_interval_ms
                    .to_string(),
            );

        // Acknowledgment is manual: no auto-commit, no auto-store.
        client_config
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false");

        if common_config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        let consumer: StreamConsumer = client_config.create()?;
        consumer.subscribe(&[topic])?;

        let inner = Inner {
            consumer,
            topic: topic.to_owned(),
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    /// Receives the next message. Blocks until one arrives; yields exactly
    /// one message per call, so a caller that commits before the next call
    /// gets strict in-partition ordering.
    pub async fn recv(&self) -> Result<ReceivedMessage, RecvErr> {
        let message = self.inner.consumer.recv().await?;

        let offset = Offset {
            handle: Arc::downgrade(&self.inner),
            partition: message.partition(),
            offset: message.offset(),
        };

        let Some(payload) = message.payload() else {
            // We auto-commit poison pills, panicking on failure
            offset.commit().expect("failed to commit empty message");
            return Err(RecvErr::Empty);
        };

        let key = message
            .key()
            .map(|k| String::from_utf8_lossy(k).into_owned());
        let payload = String::from_utf8_lossy(payload).into_owned();

        Ok(ReceivedMessage {
            topic: self.inner.topic.clone(),
            key,
            payload,
            offset,
        })
    }
}

/// Acknowledgment handle for a single received message.
pub struct Offset {
    handle: Weak<Inner>,
    partition: i32,
    offset: i64,
}

impl Offset {
    /// Synchronously commits this message's offset. Committing the current
    /// message before receiving the next is what gives the pipeline its
    /// in-order, at-least-once semantics.
    pub fn commit(self) -> Result<(), OffsetErr> {
        let inner = self.handle.upgrade().ok_or(OffsetErr::Gone)?;
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &inner.topic,
            self.partition,
            rdkafka::Offset::Offset(self.offset + 1),
        )?;
        inner.consumer.commit(&tpl, CommitMode::Sync)?;
        Ok(())
    }
}

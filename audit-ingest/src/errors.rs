use rdkafka::error::KafkaError;
use thiserror::Error;

/// Faults from the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Rejected(String),
    #[error("failed to decode stored record: {0}")]
    Decode(String),
}

/// Startup and wiring faults. Per-message faults never reach this type;
/// they are classified and routed to the error channel instead.
#[derive(Debug, Error)]
pub enum UnhandledError {
    #[error("Config error: {0}")]
    Config(#[from] envconfig::Error),
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("Sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

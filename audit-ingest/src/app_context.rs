use std::sync::Arc;
use std::time::Duration;

use common_kafka::kafka_producer::create_kafka_producer;
use health::HealthRegistry;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::config::Config;
use crate::error_reporter::{ErrorReporter, KafkaErrorReporter};
use crate::errors::UnhandledError;
use crate::store::{PostgresStore, RecordStore};

pub struct AppContext {
    pub health_registry: HealthRegistry,
    pub store: Arc<dyn RecordStore>,
    pub reporter: Arc<dyn ErrorReporter>,
    pub config: Config,
}

impl AppContext {
    pub async fn new(config: &Config) -> Result<Self, UnhandledError> {
        let health_registry = HealthRegistry::new("liveness");
        let kafka_liveness = health_registry.register("rdkafka", Duration::from_secs(30));

        let kafka_producer = create_kafka_producer(&config.kafka, kafka_liveness).await?;

        let options = PgPoolOptions::new().max_connections(config.max_pg_connections);
        let pool = options.connect(&config.database_url).await?;

        let store = Arc::new(PostgresStore::new(pool));
        let reporter = Arc::new(KafkaErrorReporter::new(
            kafka_producer,
            config.error_topic.clone(),
        ));

        info!("AppContext initialized");

        Ok(Self {
            health_registry,
            store,
            reporter,
            config: config.clone(),
        })
    }
}

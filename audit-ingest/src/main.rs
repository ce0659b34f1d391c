use std::sync::Arc;
use std::time::Duration;

use audit_ingest::app_context::AppContext;
use audit_ingest::config::Config;
use audit_ingest::pipeline::{run_consumer_loop, Handler, TopicKind};
use axum::{routing::get, Router};
use common_kafka::kafka_consumer::SingleTopicConsumer;
use health::HealthRegistry;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::task::JoinHandle;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn setup_tracing() {
    let log_layer: tracing_subscriber::filter::Filtered<
        tracing_subscriber::fmt::Layer<tracing_subscriber::Registry>,
        EnvFilter,
        tracing_subscriber::Registry,
    > = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

pub async fn index() -> &'static str {
    "audit ingestion service"
}

fn setup_metrics_recorder() -> PrometheusHandle {
    const BUCKETS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 50.0, 100.0, 250.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(BUCKETS)
        .unwrap()
        .install_recorder()
        .unwrap()
}

fn start_health_liveness_server(config: &Config, registry: HealthRegistry) -> JoinHandle<()> {
    let recorder_handle = setup_metrics_recorder();
    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route(
            "/_liveness",
            get(move || std::future::ready(registry.get_status())),
        )
        .route(
            "/metrics",
            get(move || std::future::ready(recorder_handle.render())),
        );
    let bind = format!("{}:{}", config.host, config.port);
    tokio::task::spawn(async move {
        let listener = tokio::net::TcpListener::bind(bind)
            .await
            .expect("failed to bind liveness server");
        axum::serve(listener, router)
            .await
            .expect("failed to start serving metrics");
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_tracing();
    info!("Starting up...");

    let config = Config::init_with_defaults()?;
    let context = Arc::new(AppContext::new(&config).await?);

    start_health_liveness_server(&config, context.health_registry.clone());

    let handler = Arc::new(Handler::new(context.store.clone(), context.reporter.clone()));

    let topics = [
        (TopicKind::Method, config.method_topic.clone()),
        (TopicKind::Http, config.http_topic.clone()),
        (TopicKind::Error, config.error_topic.clone()),
    ];

    let mut workers = Vec::new();
    for (kind, topic) in topics {
        let consumer = SingleTopicConsumer::new(&config.kafka, &config.consumer, &topic)?;
        let liveness = context
            .health_registry
            .register(&format!("worker-{topic}"), Duration::from_secs(60));

        info!("Subscribed to topic: {}", topic);

        workers.push(tokio::spawn(run_consumer_loop(
            consumer,
            handler.clone(),
            kind,
            liveness,
        )));
    }

    for worker in workers {
        worker.await?;
    }

    Ok(())
}

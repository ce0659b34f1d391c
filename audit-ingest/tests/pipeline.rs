use std::sync::Arc;

use audit_ingest::error_reporter::MemoryReporter;
use audit_ingest::pipeline::{Disposition, Handler, TopicKind};
use audit_ingest::store::{MemoryStore, RecordStore};
use audit_ingest::types::{Direction, ErrorType, EventType, Record};
use serde_json::{json, Value};

const METHOD_TOPIC: &str = "audit.methods";
const HTTP_TOPIC: &str = "audit.requests";
const ERROR_TOPIC: &str = "audit.errors";

fn setup() -> (Arc<MemoryStore>, Arc<MemoryReporter>, Handler) {
    let store = Arc::new(MemoryStore::new());
    let reporter = Arc::new(MemoryReporter::new());
    let handler = Handler::new(store.clone(), reporter.clone());
    (store, reporter, handler)
}

fn method_event(correlation_id: &str) -> Value {
    json!({
        "correlationId": correlation_id,
        "timestamp": "2024-01-01T00:00:00",
        "eventType": "START",
        "logLevel": "DEBUG",
        "methodName": "Foo.bar",
    })
}

fn http_incoming_event() -> Value {
    json!({
        "timestamp": "2024-01-01T00:00:00",
        "direction": "INCOMING",
        "method": "GET",
        "uri": "/api/test",
        "statusCode": 200,
        "requestBody": "test request",
        "responseBody": "test response",
    })
}

#[tokio::test]
async fn valid_method_event_is_persisted() {
    let (store, reporter, handler) = setup();

    let disposition = handler
        .handle_message(
            TopicKind::Method,
            METHOD_TOPIC,
            Some("test-key"),
            &method_event("c1").to_string(),
        )
        .await;

    assert_eq!(disposition, Disposition::Persisted);
    assert!(reporter.reported().is_empty());

    let records = store.records();
    assert_eq!(records.len(), 1);
    let Record::Method(record) = &records[0] else {
        panic!("expected a method record");
    };
    assert_eq!(record.event_type, EventType::Start);
    assert_eq!(record.method_name, "Foo.bar");
    assert_eq!(record.correlation_id, "c1");
}

#[tokio::test]
async fn valid_http_event_is_persisted_with_key_as_correlation() {
    let (store, reporter, handler) = setup();

    let disposition = handler
        .handle_message(
            TopicKind::Http,
            HTTP_TOPIC,
            Some("correlation-123"),
            &http_incoming_event().to_string(),
        )
        .await;

    assert_eq!(disposition, Disposition::Persisted);
    assert!(reporter.reported().is_empty());

    let found = store
        .http_records_by_correlation("correlation-123")
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].direction, Direction::Incoming);
    assert_eq!(found[0].method, "GET");
    assert_eq!(found[0].uri, "/api/test");
    assert_eq!(found[0].status_code, 200);
    assert_eq!(found[0].request_body.as_deref(), Some("test request"));
    assert_eq!(found[0].response_body.as_deref(), Some("test response"));
}

#[tokio::test]
async fn method_event_missing_required_fields_is_reported() {
    let (store, reporter, handler) = setup();

    let disposition = handler
        .handle_message(TopicKind::Method, METHOD_TOPIC, None, r#"{"correlationId":"c1"}"#)
        .await;

    assert_eq!(disposition, Disposition::Reported(ErrorType::ValidationError));
    assert!(store.is_empty());

    let reported = reporter.reported();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].error_type, ErrorType::ValidationError);
    assert_eq!(reported[0].error_message, "Required fields missing");
    assert_eq!(reported[0].original_topic, METHOD_TOPIC);
    assert_eq!(reported[0].original_message, r#"{"correlationId":"c1"}"#);
}

#[tokio::test]
async fn unparseable_http_payload_is_reported() {
    let (store, reporter, handler) = setup();

    let disposition = handler
        .handle_message(TopicKind::Http, HTTP_TOPIC, None, "not json")
        .await;

    assert_eq!(disposition, Disposition::Reported(ErrorType::ParsingError));
    assert!(store.is_empty());

    let reported = reporter.reported();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].error_type, ErrorType::ParsingError);
    assert_eq!(reported[0].original_topic, HTTP_TOPIC);
    assert_eq!(reported[0].original_message, "not json");
}

#[tokio::test]
async fn store_failure_is_reported_as_indexing_error() {
    let (store, reporter, handler) = setup();
    store.fail_writes_with("connection refused");

    let disposition = handler
        .handle_message(
            TopicKind::Http,
            HTTP_TOPIC,
            Some("c1"),
            &http_incoming_event().to_string(),
        )
        .await;

    assert_eq!(disposition, Disposition::Reported(ErrorType::IndexingError));
    assert!(store.is_empty());

    let reported = reporter.reported();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].error_type, ErrorType::IndexingError);
    assert_eq!(reported[0].error_message, "connection refused");
}

#[tokio::test]
async fn coercion_failure_after_validation_is_a_processing_error() {
    let (store, reporter, handler) = setup();

    let mut event = method_event("c1");
    event["eventType"] = json!("PAUSED");

    let disposition = handler
        .handle_message(TopicKind::Method, METHOD_TOPIC, None, &event.to_string())
        .await;

    assert_eq!(disposition, Disposition::Reported(ErrorType::ProcessingError));
    assert!(store.is_empty());
    assert_eq!(reporter.reported()[0].error_type, ErrorType::ProcessingError);
}

#[tokio::test]
async fn malformed_timestamp_is_a_processing_error() {
    let (_, reporter, handler) = setup();

    let mut event = http_incoming_event();
    event["timestamp"] = json!("last tuesday");

    let disposition = handler
        .handle_message(TopicKind::Http, HTTP_TOPIC, None, &event.to_string())
        .await;

    assert_eq!(disposition, Disposition::Reported(ErrorType::ProcessingError));
    assert_eq!(reporter.reported().len(), 1);
}

#[tokio::test]
async fn redelivered_message_produces_a_distinct_record() {
    let (store, _, handler) = setup();
    let payload = method_event("c1").to_string();

    handler
        .handle_message(TopicKind::Method, METHOD_TOPIC, None, &payload)
        .await;
    handler
        .handle_message(TopicKind::Method, METHOD_TOPIC, None, &payload)
        .await;

    // No content-based dedup: ids are assigned at build time
    let records = store.records();
    assert_eq!(records.len(), 2);
    assert_ne!(records[0].id(), records[1].id());
}

#[tokio::test]
async fn persisted_method_records_are_queryable_by_correlation() {
    let (store, _, handler) = setup();

    let mut end_event = method_event("c7");
    end_event["eventType"] = json!("END");
    end_event["timestamp"] = json!("2024-01-01T00:00:05");

    handler
        .handle_message(
            TopicKind::Method,
            METHOD_TOPIC,
            None,
            &method_event("c7").to_string(),
        )
        .await;
    handler
        .handle_message(TopicKind::Method, METHOD_TOPIC, None, &end_event.to_string())
        .await;
    handler
        .handle_message(
            TopicKind::Method,
            METHOD_TOPIC,
            None,
            &method_event("other").to_string(),
        )
        .await;

    let found = store.method_records_by_correlation("c7").await.unwrap();
    assert_eq!(found.len(), 2);
    // Ordered by timestamp
    assert_eq!(found[0].event_type, EventType::Start);
    assert_eq!(found[1].event_type, EventType::End);
    assert_eq!(found[0].log_level, "DEBUG");
    assert_eq!(found[0].method_name, "Foo.bar");
}

#[tokio::test]
async fn error_event_is_persisted_directly() {
    let (store, reporter, handler) = setup();

    let payload = json!({
        "id": "0190a8c2-37ad-7e60-a8ff-6f43b33e3d0f",
        "timestamp": "2024-01-01T00:00:00",
        "errorType": "PARSING_ERROR",
        "errorMessage": "boom",
        "originalTopic": "audit.requests",
        "originalMessage": "not json",
    })
    .to_string();

    let disposition = handler
        .handle_message(TopicKind::Error, ERROR_TOPIC, Some("error_x"), &payload)
        .await;

    assert_eq!(disposition, Disposition::Persisted);
    assert!(reporter.reported().is_empty());

    let records = store.records();
    assert_eq!(records.len(), 1);
    let Record::Error(record) = &records[0] else {
        panic!("expected an error record");
    };
    assert_eq!(record.id.to_string(), "0190a8c2-37ad-7e60-a8ff-6f43b33e3d0f");
    assert_eq!(record.error_type, "PARSING_ERROR");
    assert_eq!(record.original_topic, "audit.requests");
}

#[tokio::test]
async fn unparseable_error_event_is_dropped_not_reported() {
    let (store, reporter, handler) = setup();

    let disposition = handler
        .handle_message(TopicKind::Error, ERROR_TOPIC, None, "garbage")
        .await;

    assert_eq!(disposition, Disposition::Dropped);
    assert!(store.is_empty());
    // No recursive reporting from the error path
    assert!(reporter.reported().is_empty());
}

#[tokio::test]
async fn error_event_store_failure_is_dropped_not_reported() {
    let (store, reporter, handler) = setup();
    store.fail_writes_with("disk full");

    let payload = json!({"errorType": "PROCESSING_ERROR", "errorMessage": "x"}).to_string();
    let disposition = handler
        .handle_message(TopicKind::Error, ERROR_TOPIC, None, &payload)
        .await;

    assert_eq!(disposition, Disposition::Dropped);
    assert!(reporter.reported().is_empty());
}

#[tokio::test]
async fn failure_descriptor_round_trips_through_the_error_topic() {
    // A reported failure re-enters the pipeline as an error-topic message
    // and lands in the store as exactly one error record.
    let (store, reporter, handler) = setup();

    handler
        .handle_message(TopicKind::Method, METHOD_TOPIC, None, "not json")
        .await;

    let reported = reporter.reported();
    assert_eq!(reported.len(), 1);
    let republished = json!({
        "id": "0190a8c2-37ad-7e60-a8ff-6f43b33e3d10",
        "timestamp": "2024-01-01T00:00:00",
        "errorType": reported[0].error_type.as_str(),
        "errorMessage": reported[0].error_message,
        "originalTopic": reported[0].original_topic,
        "originalMessage": reported[0].original_message,
    })
    .to_string();

    let disposition = handler
        .handle_message(TopicKind::Error, ERROR_TOPIC, None, &republished)
        .await;

    assert_eq!(disposition, Disposition::Persisted);
    let records = store.records();
    assert_eq!(records.len(), 1);
    let Record::Error(record) = &records[0] else {
        panic!("expected an error record");
    };
    assert_eq!(record.error_type, "PARSING_ERROR");
    assert_eq!(record.original_topic, METHOD_TOPIC);
    assert_eq!(record.original_message, "not json");
}

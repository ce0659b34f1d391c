use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::raw_event::RawEvent;

/// A validated event that still fails to coerce into a record. Validation
/// only checks presence, so these surface after it and are classified as
/// processing errors by the pipeline.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("field {0} is missing")]
    Missing(&'static str),
    #[error("field {field} is not a valid {expected}")]
    Invalid {
        field: &'static str,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Start,
    End,
    Error,
}

impl FromStr for EventType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "START" => Ok(EventType::Start),
            "END" => Ok(EventType::End),
            "ERROR" => Ok(EventType::Error),
            _ => Err(()),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EventType::Start => write!(f, "START"),
            EventType::End => write!(f, "END"),
            EventType::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl FromStr for Direction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INCOMING" => Ok(Direction::Incoming),
            "OUTGOING" => Ok(Direction::Outgoing),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Direction::Incoming => write!(f, "INCOMING"),
            Direction::Outgoing => write!(f, "OUTGOING"),
        }
    }
}

/// Wire values of the failure taxonomy, as published to the error topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    ParsingError,
    ValidationError,
    IndexingError,
    ProcessingError,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::ParsingError => "PARSING_ERROR",
            ErrorType::ValidationError => "VALIDATION_ERROR",
            ErrorType::IndexingError => "INDEXING_ERROR",
            ErrorType::ProcessingError => "PROCESSING_ERROR",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Description of a failed processing stage, handed to the error reporter.
/// Built at the point a stage fails and consumed immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureDescriptor {
    pub error_type: ErrorType,
    pub error_message: String,
    pub original_topic: String,
    pub original_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodRecord {
    pub id: Uuid,
    pub correlation_id: String,
    pub timestamp: NaiveDateTime,
    pub event_type: EventType,
    pub log_level: String,
    pub method_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRecord {
    pub id: Uuid,
    /// Taken from the message key, not the event body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub timestamp: NaiveDateTime,
    pub direction: Direction,
    pub method: String,
    pub uri: String,
    pub status_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub id: Uuid,
    pub timestamp: NaiveDateTime,
    /// Kept as text: inbound error events may carry values outside the
    /// [`ErrorType`] taxonomy and are stored as-is.
    pub error_type: String,
    pub error_message: String,
    pub original_topic: String,
    pub original_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_stage: Option<String>,
}

/// The canonical, store-ready record shapes. A closed sum so the store can
/// switch exhaustively on the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Method(MethodRecord),
    Http(HttpRecord),
    Error(ErrorRecord),
}

impl Record {
    pub fn id(&self) -> Uuid {
        match self {
            Record::Method(r) => r.id,
            Record::Http(r) => r.id,
            Record::Error(r) => r.id,
        }
    }
}

fn required_text(event: &RawEvent, field: &'static str) -> Result<String, BuildError> {
    event.get_text(field).ok_or(BuildError::Missing(field))
}

fn parse_timestamp(event: &RawEvent) -> Result<NaiveDateTime, BuildError> {
    required_text(event, "timestamp")?
        .parse()
        .map_err(|_| BuildError::Invalid {
            field: "timestamp",
            expected: "ISO-8601 local date-time",
        })
}

/// Human-readable rendering of an argument list: `[a, 2, true]`.
fn render_values(items: &[Value]) -> String {
    let rendered: Vec<String> = items
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    format!("[{}]", rendered.join(", "))
}

impl MethodRecord {
    /// Builds a record from a validated method event. A fresh id is
    /// assigned here, never derived from the event: redelivered messages
    /// become distinct records, and the store stays idempotent per id.
    pub fn from_event(event: &RawEvent) -> Result<Self, BuildError> {
        let event_type = required_text(event, "eventType")?
            .parse()
            .map_err(|_| BuildError::Invalid {
                field: "eventType",
                expected: "event type (START, END, ERROR)",
            })?;

        let args = match event.get("arguments") {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => Some(render_values(items)),
            Some(_) => {
                return Err(BuildError::Invalid {
                    field: "arguments",
                    expected: "array",
                })
            }
        };

        Ok(Self {
            id: Uuid::now_v7(),
            correlation_id: required_text(event, "correlationId")?,
            timestamp: parse_timestamp(event)?,
            event_type,
            log_level: required_text(event, "logLevel")?,
            method_name: required_text(event, "methodName")?,
            args,
            result: event.get_text("result"),
            error_message: event.get_text("errorMessage"),
        })
    }
}

impl HttpRecord {
    /// Builds a record from a validated HTTP event. The correlation id is
    /// the message key; an absent statusCode defaults to 0 (a present but
    /// non-numeric one is a build failure, the asymmetry is deliberate).
    pub fn from_event(event: &RawEvent, key: Option<&str>) -> Result<Self, BuildError> {
        let direction = required_text(event, "direction")?
            .parse()
            .map_err(|_| BuildError::Invalid {
                field: "direction",
                expected: "direction (INCOMING, OUTGOING)",
            })?;

        let status_code = match event.get("statusCode") {
            None | Some(Value::Null) => 0,
            Some(_) => event
                .get_i64("statusCode")
                .and_then(|n| i32::try_from(n).ok())
                .ok_or(BuildError::Invalid {
                    field: "statusCode",
                    expected: "integer",
                })?,
        };

        Ok(Self {
            id: Uuid::now_v7(),
            correlation_id: key.map(str::to_owned),
            timestamp: parse_timestamp(event)?,
            direction,
            method: required_text(event, "method")?,
            uri: required_text(event, "uri")?,
            status_code,
            request_body: event.get_text("requestBody"),
            response_body: event.get_text("responseBody"),
        })
    }
}

impl ErrorRecord {
    /// Maps an inbound error event field-for-field. Best-effort: a missing
    /// or invalid id gets a fresh one, a missing or malformed timestamp
    /// gets the capture time.
    pub fn from_event(event: &RawEvent) -> Self {
        let id = event
            .get_text("id")
            .and_then(|s| Uuid::parse_str(&s).ok())
            .unwrap_or_else(Uuid::now_v7);
        let timestamp = event
            .get_text("timestamp")
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| Utc::now().naive_utc());

        Self {
            id,
            timestamp,
            error_type: event.get_text("errorType").unwrap_or_default(),
            error_message: event.get_text("errorMessage").unwrap_or_default(),
            original_topic: event.get_text("originalTopic").unwrap_or_default(),
            original_message: event.get_text("originalMessage").unwrap_or_default(),
            processing_stage: event.get_text("processingStage"),
        }
    }

    /// The reporter's record: fresh id, capture timestamp.
    pub fn from_failure(failure: &FailureDescriptor) -> Self {
        Self {
            id: Uuid::now_v7(),
            timestamp: Utc::now().naive_utc(),
            error_type: failure.error_type.to_string(),
            error_message: failure.error_message.clone(),
            original_topic: failure.original_topic.clone(),
            original_message: failure.original_message.clone(),
            processing_stage: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event_from(value: serde_json::Value) -> RawEvent {
        RawEvent::parse(&value.to_string()).unwrap()
    }

    fn method_event() -> serde_json::Value {
        json!({
            "correlationId": "c1",
            "timestamp": "2024-01-01T00:00:00",
            "eventType": "START",
            "logLevel": "DEBUG",
            "methodName": "Foo.bar",
            "arguments": ["arg1", 2, true],
            "result": "ok",
        })
    }

    fn http_event() -> serde_json::Value {
        json!({
            "timestamp": "2024-01-01T00:00:00",
            "direction": "INCOMING",
            "method": "GET",
            "uri": "/api/test",
            "statusCode": 200,
            "requestBody": "test request",
        })
    }

    #[test]
    fn method_record_fields() {
        let record = MethodRecord::from_event(&event_from(method_event())).unwrap();
        assert_eq!(record.correlation_id, "c1");
        assert_eq!(record.event_type, EventType::Start);
        assert_eq!(record.log_level, "DEBUG");
        assert_eq!(record.method_name, "Foo.bar");
        assert_eq!(record.args.as_deref(), Some("[arg1, 2, true]"));
        assert_eq!(record.result.as_deref(), Some("ok"));
        assert_eq!(record.error_message, None);
    }

    #[test]
    fn method_record_builds_are_deterministic_except_id() {
        let event = event_from(method_event());
        let a = MethodRecord::from_event(&event).unwrap();
        let b = MethodRecord::from_event(&event).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!((a.correlation_id, a.timestamp, a.event_type), (b.correlation_id, b.timestamp, b.event_type));
    }

    #[test]
    fn method_record_rejects_unknown_event_type() {
        let mut value = method_event();
        value["eventType"] = json!("PAUSED");
        assert!(MethodRecord::from_event(&event_from(value)).is_err());
    }

    #[test]
    fn method_record_rejects_malformed_timestamp() {
        let mut value = method_event();
        value["timestamp"] = json!("yesterday");
        assert!(MethodRecord::from_event(&event_from(value)).is_err());
    }

    #[test]
    fn method_record_rejects_non_array_arguments() {
        let mut value = method_event();
        value["arguments"] = json!("arg1");
        assert!(MethodRecord::from_event(&event_from(value)).is_err());
    }

    #[test]
    fn method_record_without_arguments_has_no_args() {
        let mut value = method_event();
        value.as_object_mut().unwrap().remove("arguments");
        let record = MethodRecord::from_event(&event_from(value)).unwrap();
        assert_eq!(record.args, None);
    }

    #[test]
    fn http_record_correlation_comes_from_key() {
        let record = HttpRecord::from_event(&event_from(http_event()), Some("corr-123")).unwrap();
        assert_eq!(record.correlation_id.as_deref(), Some("corr-123"));
        assert_eq!(record.direction, Direction::Incoming);
        assert_eq!(record.status_code, 200);
        assert_eq!(record.request_body.as_deref(), Some("test request"));
        assert_eq!(record.response_body, None);
    }

    #[test]
    fn http_record_status_defaults_to_zero_when_absent() {
        let mut value = http_event();
        value.as_object_mut().unwrap().remove("statusCode");
        let record = HttpRecord::from_event(&event_from(value), None).unwrap();
        assert_eq!(record.status_code, 0);
    }

    #[test]
    fn http_record_rejects_non_numeric_status() {
        let mut value = http_event();
        value["statusCode"] = json!("created");
        assert!(HttpRecord::from_event(&event_from(value), None).is_err());
    }

    #[test]
    fn error_record_from_failure_gets_fresh_id_and_wire_shape() {
        let failure = FailureDescriptor {
            error_type: ErrorType::ValidationError,
            error_message: "Required fields missing".to_string(),
            original_topic: "audit.methods".to_string(),
            original_message: "{}".to_string(),
        };
        let record = ErrorRecord::from_failure(&failure);
        assert_eq!(record.error_type, "VALIDATION_ERROR");

        let wire: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&record).unwrap()).unwrap();
        assert_eq!(wire["errorType"], "VALIDATION_ERROR");
        assert_eq!(wire["errorMessage"], "Required fields missing");
        assert_eq!(wire["originalTopic"], "audit.methods");
        assert_eq!(wire["originalMessage"], "{}");
        assert!(wire.get("processingStage").is_none());
    }

    #[test]
    fn error_record_from_event_keeps_reporter_assigned_id() {
        let id = Uuid::now_v7();
        let value = json!({
            "id": id.to_string(),
            "timestamp": "2024-01-01T00:00:00",
            "errorType": "PARSING_ERROR",
            "errorMessage": "boom",
            "originalTopic": "audit.requests",
            "originalMessage": "not json",
        });
        let record = ErrorRecord::from_event(&event_from(value));
        assert_eq!(record.id, id);
        assert_eq!(record.error_type, "PARSING_ERROR");
        assert_eq!(record.processing_stage, None);
    }

    #[test]
    fn error_record_from_event_tolerates_missing_fields() {
        let record = ErrorRecord::from_event(&event_from(json!({"errorType": "CUSTOM"})));
        assert_eq!(record.error_type, "CUSTOM");
        assert_eq!(record.error_message, "");
    }
}

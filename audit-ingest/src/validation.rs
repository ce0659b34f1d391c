use crate::raw_event::RawEvent;

/// Required fields of a method-call audit event.
pub const METHOD_REQUIRED_FIELDS: [&str; 5] = [
    "correlationId",
    "timestamp",
    "eventType",
    "logLevel",
    "methodName",
];

/// Required fields of an HTTP audit event.
pub const HTTP_REQUIRED_FIELDS: [&str; 5] = ["timestamp", "direction", "method", "uri", "statusCode"];

/// Presence and non-null checks only. Type coercion failures are left to
/// the record builders, where they surface as stage-level errors.
pub fn validate_method_event(event: &RawEvent) -> bool {
    METHOD_REQUIRED_FIELDS.iter().all(|f| event.has_non_null(f))
}

pub fn validate_http_event(event: &RawEvent) -> bool {
    HTTP_REQUIRED_FIELDS.iter().all(|f| event.has_non_null(f))
}

pub const EVENTS_RECEIVED: &str = "audit_ingest_events_received";
pub const EVENTS_PERSISTED: &str = "audit_ingest_events_persisted";
pub const EVENTS_FAILED: &str = "audit_ingest_events_failed";
pub const ERROR_EVENTS_DROPPED: &str = "audit_ingest_error_events_dropped";
pub const EMPTY_EVENTS: &str = "audit_ingest_empty_events";

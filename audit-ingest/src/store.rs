use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::types::{Direction, EventType, HttpRecord, MethodRecord, Record};

/// The record store seam: one upsert per record, keyed by the record id,
/// plus correlation lookups. No batching, no read-before-write, no internal
/// retries; retry policy belongs to callers.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn upsert(&self, record: &Record) -> Result<(), StoreError>;

    async fn method_records_by_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<MethodRecord>, StoreError>;

    async fn http_records_by_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<HttpRecord>, StoreError>;
}

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct MethodRow {
    id: Uuid,
    correlation_id: String,
    timestamp: NaiveDateTime,
    event_type: String,
    log_level: String,
    method_name: String,
    args: Option<String>,
    result: Option<String>,
    error_message: Option<String>,
}

impl TryFrom<MethodRow> for MethodRecord {
    type Error = StoreError;

    fn try_from(row: MethodRow) -> Result<Self, Self::Error> {
        let event_type = EventType::from_str(&row.event_type)
            .map_err(|_| StoreError::Decode(format!("unknown event type: {}", row.event_type)))?;
        Ok(MethodRecord {
            id: row.id,
            correlation_id: row.correlation_id,
            timestamp: row.timestamp,
            event_type,
            log_level: row.log_level,
            method_name: row.method_name,
            args: row.args,
            result: row.result,
            error_message: row.error_message,
        })
    }
}

#[derive(sqlx::FromRow)]
struct HttpRow {
    id: Uuid,
    correlation_id: Option<String>,
    timestamp: NaiveDateTime,
    direction: String,
    method: String,
    uri: String,
    status_code: i32,
    request_body: Option<String>,
    response_body: Option<String>,
}

impl TryFrom<HttpRow> for HttpRecord {
    type Error = StoreError;

    fn try_from(row: HttpRow) -> Result<Self, Self::Error> {
        let direction = Direction::from_str(&row.direction)
            .map_err(|_| StoreError::Decode(format!("unknown direction: {}", row.direction)))?;
        Ok(HttpRecord {
            id: row.id,
            correlation_id: row.correlation_id,
            timestamp: row.timestamp,
            direction,
            method: row.method,
            uri: row.uri,
            status_code: row.status_code,
            request_body: row.request_body,
            response_body: row.response_body,
        })
    }
}

#[async_trait]
impl RecordStore for PostgresStore {
    async fn upsert(&self, record: &Record) -> Result<(), StoreError> {
        match record {
            Record::Method(r) => {
                sqlx::query(
                    r#"
                    INSERT INTO audit_method_events
                        (id, correlation_id, timestamp, event_type, log_level, method_name, args, result, error_message)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    ON CONFLICT (id) DO UPDATE SET
                        correlation_id = EXCLUDED.correlation_id,
                        timestamp = EXCLUDED.timestamp,
                        event_type = EXCLUDED.event_type,
                        log_level = EXCLUDED.log_level,
                        method_name = EXCLUDED.method_name,
                        args = EXCLUDED.args,
                        result = EXCLUDED.result,
                        error_message = EXCLUDED.error_message
                    "#,
                )
                .bind(r.id)
                .bind(&r.correlation_id)
                .bind(r.timestamp)
                .bind(r.event_type.to_string())
                .bind(&r.log_level)
                .bind(&r.method_name)
                .bind(&r.args)
                .bind(&r.result)
                .bind(&r.error_message)
                .execute(&self.pool)
                .await?;
            }
            Record::Http(r) => {
                sqlx::query(
                    r#"
                    INSERT INTO audit_http_events
                        (id, correlation_id, timestamp, direction, method, uri, status_code, request_body, response_body)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    ON CONFLICT (id) DO UPDATE SET
                        correlation_id = EXCLUDED.correlation_id,
                        timestamp = EXCLUDED.timestamp,
                        direction = EXCLUDED.direction,
                        method = EXCLUDED.method,
                        uri = EXCLUDED.uri,
                        status_code = EXCLUDED.status_code,
                        request_body = EXCLUDED.request_body,
                        response_body = EXCLUDED.response_body
                    "#,
                )
                .bind(r.id)
                .bind(&r.correlation_id)
                .bind(r.timestamp)
                .bind(r.direction.to_string())
                .bind(&r.method)
                .bind(&r.uri)
                .bind(r.status_code)
                .bind(&r.request_body)
                .bind(&r.response_body)
                .execute(&self.pool)
                .await?;
            }
            Record::Error(r) => {
                sqlx::query(
                    r#"
                    INSERT INTO audit_error_events
                        (id, timestamp, error_type, error_message, original_topic, original_message, processing_stage)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    ON CONFLICT (id) DO UPDATE SET
                        timestamp = EXCLUDED.timestamp,
                        error_type = EXCLUDED.error_type,
                        error_message = EXCLUDED.error_message,
                        original_topic = EXCLUDED.original_topic,
                        original_message = EXCLUDED.original_message,
                        processing_stage = EXCLUDED.processing_stage
                    "#,
                )
                .bind(r.id)
                .bind(r.timestamp)
                .bind(&r.error_type)
                .bind(&r.error_message)
                .bind(&r.original_topic)
                .bind(&r.original_message)
                .bind(&r.processing_stage)
                .execute(&self.pool)
                .await?;
            }
        }
        debug!("Record upserted: {}", record.id());
        Ok(())
    }

    async fn method_records_by_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<MethodRecord>, StoreError> {
        let rows: Vec<MethodRow> = sqlx::query_as(
            r#"
            SELECT id, correlation_id, timestamp, event_type, log_level, method_name, args, result, error_message
            FROM audit_method_events
            WHERE correlation_id = $1
            ORDER BY timestamp
            "#,
        )
        .bind(correlation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn http_records_by_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<HttpRecord>, StoreError> {
        let rows: Vec<HttpRow> = sqlx::query_as(
            r#"
            SELECT id, correlation_id, timestamp, direction, method, uri, status_code, request_body, response_body
            FROM audit_http_events
            WHERE correlation_id = $1
            ORDER BY timestamp
            "#,
        )
        .bind(correlation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

/// In-memory store for tests and local runs. Writes can be made to fail to
/// exercise the indexing-error path.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<Uuid, Record>>,
    fail_writes_with: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All subsequent writes fail with the given message.
    pub fn fail_writes_with(&self, message: &str) {
        *self.fail_writes_with.lock().unwrap() = Some(message.to_owned());
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn upsert(&self, record: &Record) -> Result<(), StoreError> {
        if let Some(message) = self.fail_writes_with.lock().unwrap().clone() {
            return Err(StoreError::Rejected(message));
        }
        self.records
            .lock()
            .unwrap()
            .insert(record.id(), record.clone());
        Ok(())
    }

    async fn method_records_by_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<MethodRecord>, StoreError> {
        let mut found: Vec<MethodRecord> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter_map(|r| match r {
                Record::Method(m) if m.correlation_id == correlation_id => Some(m.clone()),
                _ => None,
            })
            .collect();
        found.sort_by_key(|r| r.timestamp);
        Ok(found)
    }

    async fn http_records_by_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<HttpRecord>, StoreError> {
        let mut found: Vec<HttpRecord> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter_map(|r| match r {
                Record::Http(h) if h.correlation_id.as_deref() == Some(correlation_id) => {
                    Some(h.clone())
                }
                _ => None,
            })
            .collect();
        found.sort_by_key(|r| r.timestamp);
        Ok(found)
    }
}

use serde_json::{Map, Value};

/// Loosely-typed view over a decoded event payload.
///
/// Inbound events have no fixed schema; fields are looked up by name and
/// coerced on demand. Absence and type mismatches surface as `None`, so the
/// presence/type decisions stay with the validator and the record builders.
pub struct RawEvent(Map<String, Value>);

impl RawEvent {
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Map<String, Value>>(payload).map(Self)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn has_non_null(&self, field: &str) -> bool {
        self.0.get(field).is_some_and(|v| !v.is_null())
    }

    /// Field value rendered as text: strings come back raw, other values as
    /// their JSON rendering. Null and absent fields are both `None`.
    pub fn get_text(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Integer coercion: JSON numbers directly, numeric strings parsed.
    pub fn get_i64(&self, field: &str) -> Option<i64> {
        match self.0.get(field)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

//! Row identity and timestamp columns for stores that manage them
//! themselves (the mock store and the in-memory remote client).

use crate::Record;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::Value;
use ulid::Ulid;

pub const ID: &str = "id";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// Time-ordered id: millisecond timestamp plus random suffix.
pub fn generate_id() -> String {
    Ulid::new().to_string().to_lowercase()
}

/// Current time as RFC3339 with microseconds, e.g. `2024-05-01T10:00:00.123456Z`.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// A timestamp strictly later than `previous`, or now when `previous` is
/// missing or unparsable.
pub fn next_timestamp(previous: Option<&Value>) -> String {
    let now = Utc::now();
    let floor = previous
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|ts| ts.with_timezone(&Utc) + Duration::microseconds(1));
    let next = match floor {
        Some(floor) if floor > now => floor,
        _ => now,
    };
    next.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Fill `id` (unless supplied), `created_at` and `updated_at` on a new row.
pub fn stamp_insert(record: &mut Record) {
    let missing_id = record.get(ID).map_or(true, Value::is_null);
    if missing_id {
        record.insert(ID.to_string(), Value::String(generate_id()));
    }
    let now = timestamp_now();
    record
        .entry(CREATED_AT)
        .or_insert_with(|| Value::String(now.clone()));
    record.insert(UPDATED_AT.to_string(), Value::String(now));
}

/// Merge `patch` into `record`, keeping `id`/`created_at` and advancing
/// `updated_at`.
pub fn stamp_update(record: &mut Record, patch: &Record) {
    let updated_at = next_timestamp(record.get(UPDATED_AT));
    for (column, value) in patch {
        if column == ID || column == CREATED_AT || column == UPDATED_AT {
            continue;
        }
        record.insert(column.clone(), value.clone());
    }
    record.insert(UPDATED_AT.to_string(), Value::String(updated_at));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_keeps_supplied_id() {
        let mut record: Record = serde_json::from_value(json!({"id": "mine", "a": 1})).unwrap();
        stamp_insert(&mut record);
        assert_eq!(record["id"], "mine");
        assert!(record["created_at"].is_string());
        assert_eq!(record["created_at"], record["updated_at"]);
    }

    #[test]
    fn test_generated_ids_differ() {
        assert_ne!(generate_id(), generate_id());
        assert_eq!(generate_id().len(), 26);
    }

    #[test]
    fn test_update_strictly_advances() {
        let future = "2999-01-01T00:00:00.000000Z";
        let mut record: Record = serde_json::from_value(json!({
            "id": "x", "created_at": future, "updated_at": future, "a": 1
        }))
        .unwrap();
        let patch: Record = serde_json::from_value(json!({"a": 2, "id": "y"})).unwrap();
        stamp_update(&mut record, &patch);

        assert_eq!(record["a"], 2);
        assert_eq!(record["id"], "x");
        assert_eq!(record["updated_at"], "2999-01-01T00:00:00.000001Z");
    }

    #[test]
    fn test_next_timestamp_without_previous() {
        let ts = next_timestamp(None);
        assert!(DateTime::parse_from_rfc3339(&ts).is_ok());
        assert!(ts.ends_with('Z'));
    }
}

use etl_core::{Error, RecordSet, Result};
use serde_json::Value;

/// Keys checked, in order, for records wrapped in a response envelope.
pub const ENVELOPE_KEYS: &[&str] = &["data", "results"];

/// Turn an API response body into a record set.
pub fn normalize_payload(body: &[u8]) -> Result<RecordSet> {
    let json: Value = serde_json::from_slice(body)
        .map_err(|e| Error::InvalidSourceFormat(format!("Response is not valid JSON: {}", e)))?;

    match &json {
        Value::Array(records) => RecordSet::from_json_records(records),
        Value::Object(map) => match ENVELOPE_KEYS.iter().find_map(|key| map.get(*key)) {
            Some(inner) => RecordSet::from_json_value(inner),
            None => RecordSet::from_json_records(std::slice::from_ref(&json)),
        },
        _ => Err(Error::InvalidSourceFormat(
            "Unsupported API response structure".to_string(),
        )),
    }
}

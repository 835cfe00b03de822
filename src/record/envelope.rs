//! Persisted record format
//!
//! Records are stored as a JSON envelope carrying a type tag and format
//! version. Anything under a record key that is not such an envelope for
//! that same id means the cache tier holds data we did not write, and is
//! reported as an integrity violation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::id::RecordId;
use super::replicated::{Fields, ReplicatedRecord};
use crate::error::{Error, Result};

/// Type tag written into every envelope
pub const RECORD_TYPE: &str = "wolfcache.record";

/// Current envelope format version
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    #[serde(rename = "type")]
    type_tag: &'static str,
    version: u32,
    id: &'a str,
    last_commit_time: Option<i64>,
    fields: &'a Fields,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    id: String,
    last_commit_time: Option<i64>,
    fields: Fields,
}

/// Serialize a record for storage
pub fn encode(record: &ReplicatedRecord) -> Result<Vec<u8>> {
    let envelope = EnvelopeRef {
        type_tag: RECORD_TYPE,
        version: FORMAT_VERSION,
        id: record.id().as_str(),
        last_commit_time: record.last_commit_time(),
        fields: record.fields(),
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Deserialize a stored copy of record `id`
pub fn decode(id: &RecordId, bytes: &[u8]) -> Result<ReplicatedRecord> {
    let integrity = |reason: String| Error::Integrity {
        id: id.to_string(),
        reason,
    };

    let document: Value = serde_json::from_slice(bytes)
        .map_err(|e| integrity(format!("stored value is not a record envelope: {}", e)))?;

    match document.get("type").and_then(Value::as_str) {
        Some(RECORD_TYPE) => {}
        Some(other) => return Err(integrity(format!("unexpected type tag {:?}", other))),
        None => return Err(integrity("stored value has no type tag".into())),
    }

    let envelope: Envelope = serde_json::from_value(document)
        .map_err(|e| integrity(format!("malformed record envelope: {}", e)))?;

    if envelope.version != FORMAT_VERSION {
        return Err(integrity(format!(
            "unsupported format version {}",
            envelope.version
        )));
    }
    if envelope.id != id.as_str() {
        return Err(integrity(format!(
            "stored under {:?} but belongs to {:?}",
            id.as_str(),
            envelope.id
        )));
    }

    Ok(ReplicatedRecord::from_parts(
        id.clone(),
        envelope.last_commit_time,
        envelope.fields,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_at(id: &str, time: i64, user: &str) -> ReplicatedRecord {
        let mut fields = Fields::new();
        fields.insert("user".into(), json!(user));
        ReplicatedRecord::from_parts(RecordId::new(id), Some(time), fields)
    }

    #[test]
    fn test_decode_restores_record() {
        let record = record_at("sess01", 1_700_000_000, "alice");
        let bytes = encode(&record).unwrap();

        let restored = decode(&RecordId::new("sess01"), &bytes).unwrap();
        assert_eq!(restored.last_commit_time(), Some(1_700_000_000));
        assert_eq!(restored.get("user"), Some(&json!("alice")));
        // Loaded copies carry no snapshot on their own.
        assert!(restored.is_dirty());
    }

    #[test]
    fn test_envelope_carries_type_tag() {
        let bytes = encode(&record_at("sess01", 1, "alice")).unwrap();
        let document: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(document["type"], json!(RECORD_TYPE));
        assert_eq!(document["version"], json!(FORMAT_VERSION));
    }

    #[test]
    fn test_wrong_type_is_integrity_violation() {
        let id = RecordId::new("sess01");
        let foreign = br#"{"type":"php.session","version":1,"id":"sess01","last_commit_time":1,"fields":{}}"#;

        let err = decode(&id, foreign).unwrap_err();
        assert!(matches!(err, Error::Integrity { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_garbage_and_mismatched_id_are_integrity_violations() {
        let id = RecordId::new("sess01");
        assert!(matches!(
            decode(&id, b"a:1:{s:4:\"user\";}"),
            Err(Error::Integrity { .. })
        ));

        let other = encode(&record_at("sess02", 1, "bob")).unwrap();
        assert!(matches!(decode(&id, &other), Err(Error::Integrity { .. })));
    }
}

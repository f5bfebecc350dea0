// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Payload decoding and field extraction.
//!
//! Inbound payloads are JSON objects carrying vehicle identity fields plus
//! an arbitrary `telemetry` sub-document.

use serde_json::Value;
use thiserror::Error;

/// Decode errors.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}

/// Telemetry fields extracted from one payload.
///
/// Built fresh per message and handed to the persistence gateway; never
/// retained across messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryRecord {
    /// Vehicle identification number. Empty when the payload omits it.
    pub vin: String,

    /// Trip identifier. Empty when the payload omits it.
    pub trip_id: String,

    /// The `telemetry` sub-document re-serialized as compact JSON text.
    /// An absent sub-document serializes as `null`.
    pub telemetry_json: String,
}

/// Decode one raw payload into a [`TelemetryRecord`].
///
/// Only malformed JSON fails. Absent or non-string `VIN`/`TripID` values
/// become empty strings; rejecting those is the dispatcher's policy check,
/// kept out of the decoder so decode and validation failures stay distinct.
pub fn decode(raw: &[u8]) -> Result<TelemetryRecord, DecodeError> {
    let doc: Value = serde_json::from_slice(raw)?;

    let telemetry = doc.get("telemetry").cloned().unwrap_or(Value::Null);

    Ok(TelemetryRecord {
        vin: field_as_string(&doc, "VIN"),
        trip_id: field_as_string(&doc, "TripID"),
        telemetry_json: telemetry.to_string(),
    })
}

fn field_as_string(doc: &Value, key: &str) -> String {
    doc.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_full_payload() {
        let payload = br#"{"VIN":"V1","TripID":"T1","telemetry":{"speed":10}}"#;
        let record = decode(payload).expect("decode full payload");

        assert_eq!(record.vin, "V1");
        assert_eq!(record.trip_id, "T1");
        assert_eq!(record.telemetry_json, r#"{"speed":10}"#);
    }

    #[test]
    fn test_decode_missing_identity_fields() {
        let payload = br#"{"telemetry":{"speed":10}}"#;
        let record = decode(payload).expect("decode without identity");

        assert_eq!(record.vin, "");
        assert_eq!(record.trip_id, "");
    }

    #[test]
    fn test_decode_non_string_identity_fields() {
        let payload = br#"{"VIN":123,"TripID":null,"telemetry":{}}"#;
        let record = decode(payload).expect("decode with non-string identity");

        assert_eq!(record.vin, "");
        assert_eq!(record.trip_id, "");
    }

    #[test]
    fn test_decode_missing_telemetry_stores_null() {
        let payload = br#"{"VIN":"V1","TripID":"T1"}"#;
        let record = decode(payload).expect("decode without telemetry");

        assert_eq!(record.telemetry_json, "null");
    }

    #[test]
    fn test_decode_malformed_payload() {
        let err = decode(b"not-json").unwrap_err();
        assert!(matches!(err, DecodeError::MalformedPayload(_)));

        let err = decode(b"").unwrap_err();
        assert!(matches!(err, DecodeError::MalformedPayload(_)));
    }

    #[test]
    fn test_decode_non_object_document() {
        // Well-formed JSON that is not an object decodes with empty identity
        // fields; the dispatcher's validation rejects it downstream.
        let record = decode(b"[1,2,3]").expect("decode array document");

        assert_eq!(record.vin, "");
        assert_eq!(record.trip_id, "");
        assert_eq!(record.telemetry_json, "null");
    }

    #[test]
    fn test_telemetry_round_trips_as_json() {
        let payload = br#"{"VIN":"V1","TripID":"T1","telemetry":{"speed":42,"loc":[1,2]}}"#;
        let record = decode(payload).unwrap();

        let stored: Value = serde_json::from_str(&record.telemetry_json).expect("stored text");
        assert_eq!(stored, json!({"speed": 42, "loc": [1, 2]}));
    }

    #[test]
    fn test_decode_scalar_telemetry_kept_verbatim() {
        let payload = br#"{"VIN":"V1","TripID":"T1","telemetry":7.5}"#;
        let record = decode(payload).unwrap();

        assert_eq!(record.telemetry_json, "7.5");
    }
}

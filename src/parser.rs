//! Sample parser: decrypted payload bytes to a validated [`Sample`]
//!
//! The plaintext of a datagram is a UTF-8 JSON object:
//!
//! ```text
//! {"temp": 40.1, "vib": 0.021, "sound": 50.3,
//!  "timestamp": 1718000000.5, "node_id": "node-001", "anomaly_score": 0.12}
//! ```
//!
//! `node_id`, `temp`, `vib` and `sound` are required. `timestamp` and
//! `anomaly_score` are optional; an absent (or `null`) `anomaly_score`
//! means the producer did not score the sample. Unknown fields are ignored.
//!
//! Deserializing a [`Sample`] with serde goes through the same checks.

use serde::Deserialize;
use serde_json::Value;

use crate::error::ParseError;
use crate::types::{Sample, SensorReadings};

/// Payload as received, before any field is checked
///
/// Every field is kept loosely typed so that a wrong type is reported
/// against the field name instead of as a generic decode failure. A
/// `null` value reads the same as an absent field.
#[derive(Debug, Deserialize)]
pub(crate) struct WireSample {
    node_id: Option<Value>,
    temp: Option<Value>,
    vib: Option<Value>,
    sound: Option<Value>,
    timestamp: Option<Value>,
    anomaly_score: Option<Value>,
}

impl TryFrom<WireSample> for Sample {
    type Error = ParseError;

    fn try_from(wire: WireSample) -> Result<Self, Self::Error> {
        let node_id = match wire.node_id {
            None => return Err(ParseError::MissingField("node_id")),
            Some(Value::String(s)) if s.is_empty() => return Err(ParseError::EmptyNodeId),
            Some(Value::String(s)) => s,
            Some(_) => {
                return Err(ParseError::InvalidField {
                    field: "node_id",
                    expected: "a string",
                })
            }
        };

        let readings = SensorReadings::new(
            required_number(wire.temp, "temp")?,
            required_number(wire.vib, "vib")?,
            required_number(wire.sound, "sound")?,
        );

        Ok(Sample::new(
            node_id,
            optional_number(wire.timestamp, "timestamp")?,
            readings,
            optional_number(wire.anomaly_score, "anomaly_score")?,
        ))
    }
}

/// Decode a plaintext payload into a sample
pub fn parse(bytes: &[u8]) -> Result<Sample, ParseError> {
    let text = std::str::from_utf8(bytes).map_err(|e| ParseError::Utf8(e.to_string()))?;
    let wire: WireSample =
        serde_json::from_str(text).map_err(|e| ParseError::Malformed(e.to_string()))?;
    Sample::try_from(wire)
}

/// Encode a sample into its plaintext wire form
pub fn encode(sample: &Sample) -> Result<Vec<u8>, ParseError> {
    serde_json::to_vec(sample).map_err(|e| ParseError::Malformed(e.to_string()))
}

fn required_number(value: Option<Value>, field: &'static str) -> Result<f64, ParseError> {
    let value = value.ok_or(ParseError::MissingField(field))?;
    value.as_f64().ok_or(ParseError::InvalidField {
        field,
        expected: "a number",
    })
}

fn optional_number(value: Option<Value>, field: &'static str) -> Result<Option<f64>, ParseError> {
    match value {
        None => Ok(None),
        Some(v) => v.as_f64().map(Some).ok_or(ParseError::InvalidField {
            field,
            expected: "a number",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sensor;

    #[test]
    fn test_parse_full_payload() {
        let raw = br#"{"temp": 40.1, "vib": 0.021, "sound": 50, "timestamp": 1718000000.5,
                       "node_id": "node-001", "anomaly_score": 0.12}"#;
        let s = parse(raw).unwrap();
        assert_eq!(s.node_id(), "node-001");
        assert_eq!(s.value(Sensor::Temp), 40.1);
        assert_eq!(s.value(Sensor::Vib), 0.021);
        assert_eq!(s.value(Sensor::Sound), 50.0);
        assert_eq!(s.timestamp(), Some(1718000000.5));
        assert_eq!(s.anomaly_score(), Some(0.12));
    }

    #[test]
    fn test_parse_optional_fields_absent() {
        let s = parse(br#"{"node_id":"a","temp":1,"vib":2,"sound":3}"#).unwrap();
        assert_eq!(s.timestamp(), None);
        assert!(!s.is_scored());

        let s = parse(br#"{"node_id":"a","temp":1,"vib":2,"sound":3,"anomaly_score":null}"#)
            .unwrap();
        assert!(!s.is_scored());
    }

    #[test]
    fn test_parse_missing_sensor() {
        let err = parse(br#"{"node_id":"a","temp":1,"sound":3}"#).unwrap_err();
        assert_eq!(err, ParseError::MissingField("vib"));
    }

    #[test]
    fn test_parse_missing_node_id() {
        let err = parse(br#"{"temp":1,"vib":2,"sound":3}"#).unwrap_err();
        assert_eq!(err, ParseError::MissingField("node_id"));
    }

    #[test]
    fn test_parse_wrong_types() {
        let err = parse(br#"{"node_id":"a","temp":"hot","vib":2,"sound":3}"#).unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidField {
                field: "temp",
                expected: "a number"
            }
        );

        let err = parse(br#"{"node_id":7,"temp":1,"vib":2,"sound":3}"#).unwrap_err();
        assert!(matches!(err, ParseError::InvalidField { field: "node_id", .. }));

        let err =
            parse(br#"{"node_id":"a","temp":1,"vib":2,"sound":3,"timestamp":"now"}"#).unwrap_err();
        assert!(matches!(err, ParseError::InvalidField { field: "timestamp", .. }));
    }

    #[test]
    fn test_null_required_field_is_missing() {
        let err = parse(br#"{"node_id":"a","temp":null,"vib":2,"sound":3}"#).unwrap_err();
        assert_eq!(err, ParseError::MissingField("temp"));
    }

    #[test]
    fn test_serde_deserialize_applies_parser_checks() {
        let err = serde_json::from_str::<Sample>(r#"{"node_id":"","temp":1,"vib":2,"sound":3}"#)
            .unwrap_err();
        assert!(err.to_string().contains("empty"));

        let s: Sample =
            serde_json::from_str(r#"{"node_id":"n","temp":1,"vib":2,"sound":3,"extra":true}"#)
                .unwrap();
        assert_eq!(s.value(Sensor::Sound), 3.0);
        assert!(serde_json::from_str::<Sample>(r#"{"node_id":"n","temp":1,"vib":2}"#).is_err());
    }

    #[test]
    fn test_parse_empty_node_id() {
        let err = parse(br#"{"node_id":"","temp":1,"vib":2,"sound":3}"#).unwrap_err();
        assert_eq!(err, ParseError::EmptyNodeId);
    }

    #[test]
    fn test_parse_not_json() {
        assert!(matches!(parse(b"temp=40"), Err(ParseError::Malformed(_))));
        assert!(matches!(parse(b"[1,2,3]"), Err(ParseError::Malformed(_))));
        assert!(matches!(parse(&[0xff, 0xfe]), Err(ParseError::Utf8(_))));
    }

    #[test]
    fn test_encode_then_parse() {
        let sample = Sample::new(
            "edge-7",
            Some(12.5),
            SensorReadings::new(39.9, 0.018, 51.2),
            Some(1.25),
        );
        let bytes = encode(&sample).unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.contains("\"vib\":0.018"));
        assert_eq!(parse(&bytes).unwrap(), sample);
    }

    #[test]
    fn test_encode_omits_missing_score() {
        let sample = Sample::new("edge-7", None, SensorReadings::new(1.0, 2.0, 3.0), None);
        let text = String::from_utf8(encode(&sample).unwrap()).unwrap();
        assert!(!text.contains("anomaly_score"));
        assert!(!text.contains("timestamp"));
    }
}

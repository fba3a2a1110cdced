//! Replayable telemetry events.
//!
//! One JSON object per report, either a vendor data point
//! (`{"dp": 1, "value": 0, "raw": 0}`) or a cluster attribute
//! (`{"cluster": 1026, "name": "temperatureMeasurement", "attribute": "measuredValue", "value": 2150}`).
//! An optional `ts` carries the unix millisecond timestamp.

use serde::{Deserialize, Serialize};

use crate::signal::SampleValue;

/// Vendor data point report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DpReport {
    pub dp: u8,
    pub value: SampleValue,
    /// Undecoded payload, kept opaque.
    #[serde(default)]
    pub raw: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

/// Standard cluster attribute report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZclReport {
    pub cluster: u16,
    #[serde(default)]
    pub name: String,
    pub attribute: String,
    pub value: SampleValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

/// A single telemetry report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TelemetryEvent {
    Dp(DpReport),
    Zcl(ZclReport),
}

impl TelemetryEvent {
    pub fn timestamp(&self) -> Option<i64> {
        match self {
            TelemetryEvent::Dp(r) => r.ts,
            TelemetryEvent::Zcl(r) => r.ts,
        }
    }

    pub fn dp(dp: u8, value: impl Into<SampleValue>) -> Self {
        let value = value.into();
        let raw = serde_json::to_value(&value).unwrap_or_default();
        TelemetryEvent::Dp(DpReport {
            dp,
            value,
            raw,
            ts: None,
        })
    }

    pub fn zcl(cluster: u16, name: &str, attribute: &str, value: impl Into<SampleValue>) -> Self {
        TelemetryEvent::Zcl(ZclReport {
            cluster,
            name: name.to_string(),
            attribute: attribute.to_string(),
            value: value.into(),
            ts: None,
        })
    }

    pub fn at(mut self, ts: i64) -> Self {
        match &mut self {
            TelemetryEvent::Dp(r) => r.ts = Some(ts),
            TelemetryEvent::Zcl(r) => r.ts = Some(ts),
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dp_event() {
        let event: TelemetryEvent =
            serde_json::from_str(r#"{"dp": 1, "value": 0, "raw": [0], "ts": 1700000000000}"#)
                .unwrap();
        match &event {
            TelemetryEvent::Dp(r) => {
                assert_eq!(r.dp, 1);
                assert_eq!(r.value, SampleValue::Number(0.0));
                assert_eq!(r.raw, serde_json::json!([0]));
            }
            other => panic!("expected dp report, got {:?}", other),
        }
        assert_eq!(event.timestamp(), Some(1_700_000_000_000));
    }

    #[test]
    fn test_parse_zcl_event() {
        let event: TelemetryEvent = serde_json::from_str(
            r#"{"cluster": 6, "name": "onOff", "attribute": "onOff", "value": true}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            TelemetryEvent::zcl(6, "onOff", "onOff", true)
        );
        assert_eq!(event.timestamp(), None);
    }

    #[test]
    fn test_dp_id_out_of_range_is_rejected() {
        assert!(serde_json::from_str::<TelemetryEvent>(r#"{"dp": 300, "value": 1}"#).is_err());
    }

    #[test]
    fn test_builders() {
        let event = TelemetryEvent::dp(5, 215.0).at(42);
        assert_eq!(event.timestamp(), Some(42));
        match event {
            TelemetryEvent::Dp(r) => assert_eq!(r.raw, serde_json::json!(215.0)),
            other => panic!("expected dp report, got {:?}", other),
        }
    }
}

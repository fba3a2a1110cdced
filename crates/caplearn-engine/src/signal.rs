//! Signal classification.
//!
//! A source's semantic type is derived from its latest value plus the running
//! summary of everything it has reported this session. The numeric ladder is
//! ordered and the first matching rung wins; several ranges overlap, so the
//! order is part of the behaviour.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Interpreted value of a single report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    Boolean(bool),
    Number(f64),
    Text(String),
}

impl SampleValue {
    /// Finite numeric value, if any.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{}", v),
            Self::Number(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<bool> for SampleValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<f64> for SampleValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for SampleValue {
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<String> for SampleValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for SampleValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Semantic type of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Boolean,
    Percentage,
    Temperature,
    /// Temperature in tenths of a degree.
    TemperatureRaw,
    Luminance,
    Power,
    Number,
    #[serde(rename = "string")]
    Text,
    Unknown,
}

impl SemanticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Percentage => "percentage",
            Self::Temperature => "temperature",
            Self::TemperatureRaw => "temperature_raw",
            Self::Luminance => "luminance",
            Self::Power => "power",
            Self::Number => "number",
            Self::Text => "string",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running min/max over numeric values. Empty until the first number arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservedRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ObservedRange {
    pub fn include(&mut self, value: f64) {
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    /// True when both bounds exist and lie within `[lo, hi]`.
    pub fn within(&self, lo: f64, hi: f64) -> bool {
        match (self.min, self.max) {
            (Some(min), Some(max)) => min >= lo && max <= hi,
            _ => false,
        }
    }
}

/// Everything the classifier needs to know about a source's history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalSummary {
    pub range: ObservedRange,
    /// Every numeric value so far was exactly 0 or 1. Once cleared it stays
    /// cleared for the session.
    pub binary: bool,
    /// Numeric samples seen.
    pub numeric_count: usize,
}

impl Default for SignalSummary {
    fn default() -> Self {
        Self {
            range: ObservedRange::default(),
            binary: true,
            numeric_count: 0,
        }
    }
}

impl SignalSummary {
    /// Fold one sample into the summary.
    ///
    /// Non-finite numbers clear `binary` but stay out of the range.
    pub fn update(&mut self, value: &SampleValue) {
        if let SampleValue::Number(v) = value {
            if *v != 0.0 && *v != 1.0 {
                self.binary = false;
            }
        }
        if let Some(v) = value.as_f64() {
            self.range.include(v);
            self.numeric_count += 1;
        }
    }
}

/// Classify a source given its latest value and an already-updated summary.
pub fn classify(latest: &SampleValue, summary: &SignalSummary) -> SemanticType {
    match latest {
        SampleValue::Boolean(_) => SemanticType::Boolean,
        SampleValue::Text(_) => SemanticType::Text,
        SampleValue::Number(_) => classify_numeric(summary),
    }
}

fn classify_numeric(summary: &SignalSummary) -> SemanticType {
    let range = &summary.range;
    if summary.numeric_count == 0 {
        return SemanticType::Unknown;
    }

    if summary.binary {
        SemanticType::Boolean
    } else if range.within(0.0, 100.0) {
        SemanticType::Percentage
    } else if range.within(-400.0, 800.0) {
        SemanticType::TemperatureRaw
    } else if range.within(-40.0, 80.0) {
        SemanticType::Temperature
    } else if range.within(0.0, 100_000.0) {
        SemanticType::Luminance
    } else if range.within(0.0, 50_000.0) {
        SemanticType::Power
    } else {
        SemanticType::Number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_all(values: &[f64]) -> SemanticType {
        let mut summary = SignalSummary::default();
        let mut last = SemanticType::Unknown;
        for v in values {
            let value = SampleValue::Number(*v);
            summary.update(&value);
            last = classify(&value, &summary);
        }
        last
    }

    #[test]
    fn test_binary_values_are_boolean() {
        assert_eq!(classify_all(&[0.0, 1.0]), SemanticType::Boolean);
        assert_eq!(classify_all(&[1.0, 1.0, 0.0, 0.0, 1.0]), SemanticType::Boolean);
        // A lone 1 is read as boolean first
        assert_eq!(classify_all(&[1.0]), SemanticType::Boolean);
    }

    #[test]
    fn test_percentage_wins_over_temperature() {
        assert_eq!(classify_all(&[5.0, 80.0]), SemanticType::Percentage);
        assert_eq!(classify_all(&[80.0, 5.0, 42.0]), SemanticType::Percentage);
    }

    #[test]
    fn test_boolean_is_sticky() {
        // Once a non-binary value has been seen, 0/1 never narrows back
        assert_eq!(classify_all(&[0.0, 57.0, 1.0, 0.0]), SemanticType::Percentage);
    }

    #[test]
    fn test_tenths_of_degree() {
        assert_eq!(classify_all(&[215.0, 218.0, 221.0]), SemanticType::TemperatureRaw);
        assert_eq!(classify_all(&[-55.0, 20.0]), SemanticType::TemperatureRaw);
    }

    #[test]
    fn test_wide_ranges() {
        assert_eq!(classify_all(&[0.0, 1500.0]), SemanticType::Luminance);
        assert_eq!(classify_all(&[-500.0, 20.0]), SemanticType::Number);
        assert_eq!(classify_all(&[0.0, 250_000.0]), SemanticType::Number);
    }

    #[test]
    fn test_native_values_bypass_ladder() {
        let mut summary = SignalSummary::default();
        let value = SampleValue::Boolean(true);
        summary.update(&value);
        assert_eq!(classify(&value, &summary), SemanticType::Boolean);

        let value = SampleValue::from("auto");
        summary.update(&value);
        assert_eq!(classify(&value, &summary), SemanticType::Text);
        assert_eq!(summary.numeric_count, 0);
    }

    #[test]
    fn test_non_finite_number_is_unknown() {
        let mut summary = SignalSummary::default();
        let value = SampleValue::Number(f64::NAN);
        summary.update(&value);
        assert_eq!(classify(&value, &summary), SemanticType::Unknown);
    }

    #[test]
    fn test_non_finite_number_breaks_binary() {
        assert_eq!(classify_all(&[0.0, 1.0, f64::INFINITY]), SemanticType::Percentage);
        assert_eq!(classify_all(&[1.0, f64::NAN, 0.0]), SemanticType::Percentage);
        assert_ne!(classify_all(&[0.0, f64::NEG_INFINITY, 1.0]), SemanticType::Boolean);
    }

    #[test]
    fn test_sample_value_untagged_json() {
        let values: Vec<SampleValue> = serde_json::from_str(r#"[true, 21.5, 3, "on"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                SampleValue::Boolean(true),
                SampleValue::Number(21.5),
                SampleValue::Number(3.0),
                SampleValue::Text("on".to_string()),
            ]
        );
    }

    #[test]
    fn test_semantic_type_names() {
        assert_eq!(
            serde_json::to_string(&SemanticType::TemperatureRaw).unwrap(),
            "\"temperature_raw\""
        );
        assert_eq!(serde_json::to_string(&SemanticType::Text).unwrap(), "\"string\"");
    }
}

//! Knowledge tables for capability inference.
//!
//! Two independent tables: vendor data points (ambiguous, an ordered
//! candidate list per id narrowed by semantic type) and standard clusters
//! (one capability per cluster).

use std::collections::BTreeMap;

use crate::capability::{Candidate, Capability};
use crate::signal::{ObservedRange, SemanticType};

/// Data point ids that carry battery level when they report a percentage.
pub const BATTERY_DP_IDS: &[u8] = &[15, 4, 2];

/// Data point ids that carry relative humidity when they report a percentage.
pub const HUMIDITY_DP_IDS: &[u8] = &[3, 6, 104];

/// Luminance below this is more likely a small counter than light level.
pub const MIN_LUMINANCE_MAX: f64 = 100.0;

/// Standard cluster identifiers.
pub mod clusters {
    pub const POWER_CONFIGURATION: u16 = 0x0001;
    pub const ON_OFF: u16 = 0x0006;
    pub const LEVEL_CONTROL: u16 = 0x0008;
    pub const WINDOW_COVERING: u16 = 0x0102;
    pub const COLOR_CONTROL: u16 = 0x0300;
    pub const ILLUMINANCE_MEASUREMENT: u16 = 0x0400;
    pub const TEMPERATURE_MEASUREMENT: u16 = 0x0402;
    pub const RELATIVE_HUMIDITY: u16 = 0x0405;
    pub const IAS_ZONE: u16 = 0x0500;
    pub const METERING: u16 = 0x0702;
    pub const ELECTRICAL_MEASUREMENT: u16 = 0x0B04;
}

/// What a data point usually means across vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DpContext {
    SwitchOrSensor,
    SwitchOrBattery,
    Measurement,
    BatteryOrAlarm,
    Temperature,
    Humidity,
    Alarm,
    Battery,
    Presence,
    LuminanceOrSetting,
    HumidityOrSetting,
    Setting,
    Luminance,
    Thermostat,
    Dimmer,
    Color,
    ColorTemperature,
    Power,
}

/// Ordered candidates for one data point id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DpPattern {
    pub candidates: Vec<Candidate>,
    pub context: DpContext,
}

impl DpPattern {
    pub fn new(names: &[&'static str], context: DpContext) -> Self {
        Self {
            candidates: names.iter().copied().map(Candidate::named).collect(),
            context,
        }
    }

    fn first_where(&self, eligible: impl Fn(&Candidate) -> bool) -> Option<Candidate> {
        self.candidates.iter().copied().find(|c| eligible(c))
    }
}

/// Both inference tables.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    dp_patterns: BTreeMap<u8, DpPattern>,
    cluster_patterns: BTreeMap<u16, Capability>,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::builtin()
    }
}

impl KnowledgeBase {
    /// Tables with no entries; every inference returns none.
    pub fn empty() -> Self {
        Self {
            dp_patterns: BTreeMap::new(),
            cluster_patterns: BTreeMap::new(),
        }
    }

    /// Tables covering common Tuya data points and the standard clusters.
    pub fn builtin() -> Self {
        use DpContext::*;

        let dp = [
            // Switches, relays and simple sensors
            (1, DpPattern::new(&["onoff", "alarm_motion", "alarm_contact"], SwitchOrSensor)),
            (2, DpPattern::new(&["onoff", "measure_battery"], SwitchOrBattery)),
            (3, DpPattern::new(&["measure_humidity", "measure_soil_moisture", "measure_luminance"], Measurement)),
            (4, DpPattern::new(&["measure_battery", "alarm_water"], BatteryOrAlarm)),
            (5, DpPattern::new(&["measure_temperature"], Temperature)),
            (6, DpPattern::new(&["measure_humidity"], Humidity)),
            // Battery devices
            (14, DpPattern::new(&["alarm_battery", "alarm_water"], Alarm)),
            (15, DpPattern::new(&["measure_battery"], Battery)),
            // Thermostats
            (16, DpPattern::new(&["target_temperature"], Thermostat)),
            (24, DpPattern::new(&["measure_temperature"], Thermostat)),
            // Dimmers and lights
            (20, DpPattern::new(&["dim"], Dimmer)),
            (21, DpPattern::new(&["light_hue"], Color)),
            (22, DpPattern::new(&["light_saturation"], Color)),
            (23, DpPattern::new(&["light_temperature"], ColorTemperature)),
            // Presence radars
            (101, DpPattern::new(&["alarm_motion", "measure_presence_time"], Presence)),
            (102, DpPattern::new(&["measure_luminance", "fading_time"], LuminanceOrSetting)),
            (103, DpPattern::new(&["measure_temperature"], Temperature)),
            (104, DpPattern::new(&["measure_humidity", "detection_distance"], HumidityOrSetting)),
            (105, DpPattern::new(&["sensitivity"], Setting)),
            (106, DpPattern::new(&["measure_luminance"], Luminance)),
            (109, DpPattern::new(&["measure_humidity"], Humidity)),
        ];

        let cluster_table = [
            (clusters::ON_OFF, Capability::Onoff),
            (clusters::LEVEL_CONTROL, Capability::Dim),
            (clusters::COLOR_CONTROL, Capability::LightHue),
            (clusters::TEMPERATURE_MEASUREMENT, Capability::MeasureTemperature),
            (clusters::RELATIVE_HUMIDITY, Capability::MeasureHumidity),
            (clusters::ILLUMINANCE_MEASUREMENT, Capability::MeasureLuminance),
            (clusters::POWER_CONFIGURATION, Capability::MeasureBattery),
            (clusters::IAS_ZONE, Capability::AlarmMotion),
            (clusters::METERING, Capability::MeterPower),
            (clusters::ELECTRICAL_MEASUREMENT, Capability::MeasurePower),
            (clusters::WINDOW_COVERING, Capability::WindowcoveringsSet),
        ];

        Self {
            dp_patterns: dp.into_iter().collect(),
            cluster_patterns: cluster_table.into_iter().collect(),
        }
    }

    /// Add or replace a data point entry.
    pub fn with_dp_pattern(mut self, dp_id: u8, pattern: DpPattern) -> Self {
        self.dp_patterns.insert(dp_id, pattern);
        self
    }

    /// Candidate capability for a data point, or `None` when the evidence is
    /// not conclusive.
    ///
    /// The result may be an unrecognized candidate; callers must resolve it
    /// through [`Candidate::capability`] before applying it.
    pub fn infer_from_dp(
        &self,
        dp_id: u8,
        semantic_type: SemanticType,
        range: &ObservedRange,
    ) -> Option<Candidate> {
        let pattern = self.dp_patterns.get(&dp_id);

        match semantic_type {
            SemanticType::Boolean => pattern?.first_where(Candidate::is_binary_kind),
            SemanticType::Percentage => {
                if BATTERY_DP_IDS.contains(&dp_id) {
                    Some(Capability::MeasureBattery.into())
                } else if HUMIDITY_DP_IDS.contains(&dp_id) {
                    Some(Capability::MeasureHumidity.into())
                } else {
                    pattern?.first_where(Candidate::is_percentage_kind)
                }
            }
            SemanticType::Temperature | SemanticType::TemperatureRaw => {
                Some(Capability::MeasureTemperature.into())
            }
            SemanticType::Luminance => match range.max {
                Some(max) if max > MIN_LUMINANCE_MAX => Some(Capability::MeasureLuminance.into()),
                _ => None,
            },
            SemanticType::Power => {
                let pattern = pattern?;
                if pattern.context == DpContext::Power {
                    pattern.candidates.first().copied()
                } else {
                    None
                }
            }
            SemanticType::Number | SemanticType::Text | SemanticType::Unknown => None,
        }
    }

    /// Capability for a standard cluster.
    pub fn infer_from_cluster(&self, cluster_id: u16) -> Option<Capability> {
        self.cluster_patterns.get(&cluster_id).copied()
    }
}

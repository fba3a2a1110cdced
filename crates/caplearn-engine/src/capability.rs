//! Recognized device capabilities.
//!
//! [`Capability`] is the allow-list: a string becomes a capability only
//! through [`FromStr`], so nothing outside this enum can reach a device or a
//! stored profile.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Capability identifier understood by the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Onoff,
    Dim,
    LightHue,
    LightSaturation,
    LightTemperature,
    AlarmMotion,
    AlarmContact,
    AlarmWater,
    AlarmSmoke,
    AlarmGas,
    AlarmTamper,
    AlarmBattery,
    MeasureTemperature,
    MeasureHumidity,
    MeasureLuminance,
    MeasureBattery,
    MeasurePower,
    MeasureVoltage,
    MeasureCurrent,
    MeterPower,
    MeasureSoilMoisture,
    MeasureVoc,
    MeasureCo2,
    MeasurePm25,
    TargetTemperature,
    WindowcoveringsSet,
}

impl Capability {
    /// All recognized capabilities.
    pub const ALL: &'static [Capability] = &[
        Capability::Onoff,
        Capability::Dim,
        Capability::LightHue,
        Capability::LightSaturation,
        Capability::LightTemperature,
        Capability::AlarmMotion,
        Capability::AlarmContact,
        Capability::AlarmWater,
        Capability::AlarmSmoke,
        Capability::AlarmGas,
        Capability::AlarmTamper,
        Capability::AlarmBattery,
        Capability::MeasureTemperature,
        Capability::MeasureHumidity,
        Capability::MeasureLuminance,
        Capability::MeasureBattery,
        Capability::MeasurePower,
        Capability::MeasureVoltage,
        Capability::MeasureCurrent,
        Capability::MeterPower,
        Capability::MeasureSoilMoisture,
        Capability::MeasureVoc,
        Capability::MeasureCo2,
        Capability::MeasurePm25,
        Capability::TargetTemperature,
        Capability::WindowcoveringsSet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Onoff => "onoff",
            Self::Dim => "dim",
            Self::LightHue => "light_hue",
            Self::LightSaturation => "light_saturation",
            Self::LightTemperature => "light_temperature",
            Self::AlarmMotion => "alarm_motion",
            Self::AlarmContact => "alarm_contact",
            Self::AlarmWater => "alarm_water",
            Self::AlarmSmoke => "alarm_smoke",
            Self::AlarmGas => "alarm_gas",
            Self::AlarmTamper => "alarm_tamper",
            Self::AlarmBattery => "alarm_battery",
            Self::MeasureTemperature => "measure_temperature",
            Self::MeasureHumidity => "measure_humidity",
            Self::MeasureLuminance => "measure_luminance",
            Self::MeasureBattery => "measure_battery",
            Self::MeasurePower => "measure_power",
            Self::MeasureVoltage => "measure_voltage",
            Self::MeasureCurrent => "measure_current",
            Self::MeterPower => "meter_power",
            Self::MeasureSoilMoisture => "measure_soil_moisture",
            Self::MeasureVoc => "measure_voc",
            Self::MeasureCo2 => "measure_co2",
            Self::MeasurePm25 => "measure_pm25",
            Self::TargetTemperature => "target_temperature",
            Self::WindowcoveringsSet => "windowcoverings_set",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::UnknownCapability(s.to_string()))
    }
}

/// Entry in a knowledge table.
///
/// Vendor tables also list data points that are device settings rather than
/// capabilities (`sensitivity`, `fading_time`); those stay as names and are
/// rejected when inference selects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    Known(Capability),
    Unrecognized(&'static str),
}

impl Candidate {
    /// Build a candidate from a table name, resolving recognized capabilities.
    pub fn named(name: &'static str) -> Self {
        match name.parse() {
            Ok(capability) => Candidate::Known(capability),
            Err(_) => Candidate::Unrecognized(name),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Candidate::Known(c) => c.as_str(),
            Candidate::Unrecognized(name) => name,
        }
    }

    pub fn capability(&self) -> Option<Capability> {
        match self {
            Candidate::Known(c) => Some(*c),
            Candidate::Unrecognized(_) => None,
        }
    }

    /// Eligible for a binary signal: an alarm or a switch.
    pub fn is_binary_kind(&self) -> bool {
        let name = self.name();
        name.starts_with("alarm_") || name == "onoff"
    }

    /// Eligible for a 0–100 signal: a measurement or a dimmer.
    pub fn is_percentage_kind(&self) -> bool {
        let name = self.name();
        name.starts_with("measure_") || name == "dim"
    }
}

impl From<Capability> for Candidate {
    fn from(c: Capability) -> Self {
        Candidate::Known(c)
    }
}

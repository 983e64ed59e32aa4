//! Engineering readings produced from hub replies

use crate::error_code::ErrorCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier the collection server assigns to a sensor channel
pub type SensorId = u32;

/// Reading type tag as reported to the collection server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadingType {
    #[serde(rename = "SHT_T")]
    Temperature,
    #[serde(rename = "SHT_RH")]
    Humidity,
    #[serde(rename = "wind")]
    Wind,
    #[serde(rename = "tach")]
    Tach,
    #[serde(rename = "TC_A")]
    ThermocoupleA,
    #[serde(rename = "TC_B")]
    ThermocoupleB,
    #[serde(rename = "pressure")]
    Pressure,
    #[serde(rename = "pressure_wide")]
    PressureWide,
    #[serde(rename = "pressure_wide_super")]
    PressureWideAverage,
    #[serde(rename = "MPT")]
    MultiPoint,
}

impl ReadingType {
    /// Get the upload tag for this type
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingType::Temperature => "SHT_T",
            ReadingType::Humidity => "SHT_RH",
            ReadingType::Wind => "wind",
            ReadingType::Tach => "tach",
            ReadingType::ThermocoupleA => "TC_A",
            ReadingType::ThermocoupleB => "TC_B",
            ReadingType::Pressure => "pressure",
            ReadingType::PressureWide => "pressure_wide",
            ReadingType::PressureWideAverage => "pressure_wide_super",
            ReadingType::MultiPoint => "MPT",
        }
    }
}

impl fmt::Display for ReadingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single sensor reading
///
/// `value` is `None` when no engineering value could be produced; in that case
/// `error_code` says why. A reading may also carry both a value and an error
/// code, e.g. when the device answered with its power-on default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_id: SensorId,
    #[serde(rename = "type")]
    pub kind: ReadingType,
    pub value: Option<f64>,
    #[serde(rename = "raw_data")]
    pub raw: Option<f64>,
    #[serde(rename = "datetime")]
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_code: Option<ErrorCode>,
}

impl Reading {
    /// Create a reading with a valid engineering value
    pub fn new(
        sensor_id: SensorId,
        kind: ReadingType,
        value: f64,
        raw: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            sensor_id,
            kind,
            value: Some(value),
            raw: Some(raw),
            timestamp,
            error_code: None,
        }
    }

    /// Create a reading that only reports an error
    pub fn failed(
        sensor_id: SensorId,
        kind: ReadingType,
        raw: Option<f64>,
        code: ErrorCode,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            sensor_id,
            kind,
            value: None,
            raw,
            timestamp,
            error_code: Some(code),
        }
    }

    /// Attach an error code, keeping the value
    pub fn with_error(mut self, code: ErrorCode) -> Self {
        self.error_code = Some(code);
        self
    }

    /// Check if this reading carries a usable engineering value
    pub fn is_valid(&self) -> bool {
        self.value.is_some() && self.error_code.is_none()
    }
}

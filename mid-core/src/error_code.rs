//! Error codes reported per sensor or per hub address index
//!
//! Two namespaces share one byte: small codes reported by the hub itself in
//! an error list reply, and codes the MID assigns when it could not obtain or
//! convert a reading.

use crate::reading::SensorId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error code attached to a reading or an error record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub u8);

impl ErrorCode {
    /// Multi-point sensor configured but not found on the bus
    pub const MISSING: ErrorCode = ErrorCode(1);
    /// Hub: request had an invalid address count
    pub const BAD_ADDRESS_COUNT: ErrorCode = ErrorCode(2);
    /// Hub: unit did not answer
    pub const UNIT_TIMEOUT: ErrorCode = ErrorCode(4);
    /// Hub: unknown command code
    pub const BAD_COMMAND_CODE: ErrorCode = ErrorCode(5);
    /// Hub: unit reply failed its CRC
    pub const BAD_CRC: ErrorCode = ErrorCode(6);
    /// Hub: unit reply had an unexpected payload size
    pub const BAD_UNIT_REPLY_SIZE: ErrorCode = ErrorCode(7);
    /// MID: no reply from the hub in time
    pub const TIMEOUT: ErrorCode = ErrorCode(9);
    /// Hub: unit does not implement the requested feature
    pub const MISSING_FEATURE: ErrorCode = ErrorCode(10);
    /// MID: reply could not be parsed
    pub const PARSE: ErrorCode = ErrorCode(51);
    /// MID: engineering conversion failed
    pub const ENGINEERING: ErrorCode = ErrorCode(52);
    /// MID: device returned its default (never measured) value
    pub const DEFAULT_VALUE: ErrorCode = ErrorCode(185);

    /// Hub fault codes as defined by the hub firmware
    pub const DEVICE_CODES: [u8; 9] = [1, 2, 3, 4, 5, 6, 7, 8, 10];

    /// Get raw code value
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Check if this code belongs to the hub-reported namespace
    pub fn is_device_fault(&self) -> bool {
        Self::DEVICE_CODES.contains(&self.0)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            ErrorCode::BAD_ADDRESS_COUNT => "bad address count",
            ErrorCode::UNIT_TIMEOUT => "unit timeout",
            ErrorCode::BAD_COMMAND_CODE => "bad command code",
            ErrorCode::BAD_CRC => "bad crc",
            ErrorCode::BAD_UNIT_REPLY_SIZE => "bad unit reply size",
            ErrorCode::TIMEOUT => "timeout",
            ErrorCode::MISSING_FEATURE => "missing feature",
            ErrorCode::PARSE => "parse failure",
            ErrorCode::ENGINEERING => "engineering conversion failure",
            ErrorCode::DEFAULT_VALUE => "device default value",
            _ => "device fault",
        };
        write!(f, "{} ({})", self.0, name)
    }
}

/// What an error record refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorTarget {
    /// 1-based position of the unit in the address list of the command
    AddressIndex(u8),
    /// Sensor identifier
    Sensor(SensorId),
}

/// A single (code, target) error pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub code: ErrorCode,
    pub target: ErrorTarget,
}

impl ErrorRecord {
    pub fn new(code: ErrorCode, target: ErrorTarget) -> Self {
        Self { code, target }
    }

    pub fn for_sensor(code: ErrorCode, sensor_id: SensorId) -> Self {
        Self::new(code, ErrorTarget::Sensor(sensor_id))
    }

    pub fn for_address_index(code: ErrorCode, index: u8) -> Self {
        Self::new(code, ErrorTarget::AddressIndex(index))
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target {
            ErrorTarget::AddressIndex(index) => write!(f, "{} at address index {}", self.code, index),
            ErrorTarget::Sensor(id) => write!(f, "{} for sensor {}", self.code, id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaces() {
        assert!(ErrorCode::UNIT_TIMEOUT.is_device_fault());
        assert!(ErrorCode(10).is_device_fault());
        assert!(!ErrorCode::TIMEOUT.is_device_fault());
        assert!(!ErrorCode::PARSE.is_device_fault());
        assert!(!ErrorCode::ENGINEERING.is_device_fault());
    }

    #[test]
    fn test_record_display() {
        let record = ErrorRecord::for_sensor(ErrorCode::PARSE, 42);
        assert_eq!(record.to_string(), "51 (parse failure) for sensor 42");
    }
}

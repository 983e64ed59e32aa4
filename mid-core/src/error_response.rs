//! Cycle-wide accumulation of error records

use crate::error_code::{ErrorCode, ErrorRecord, ErrorTarget};
use crate::reading::SensorId;
use serde::{Deserialize, Serialize};

/// Error records gathered across every command of one reading cycle
///
/// Append-only. Records are never rewritten once added; the upload layer
/// receives them in the order they were reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    records: Vec<ErrorRecord>,
}

impl ErrorResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ErrorRecord> {
        self.records
    }

    pub fn push(&mut self, record: ErrorRecord) {
        self.records.push(record);
    }

    /// Record an engineering-conversion failure for each sensor id
    pub fn add_engineering_errors<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = SensorId>,
    {
        self.add_for_sensors(ErrorCode::ENGINEERING, ids);
    }

    /// Record a parse failure for each sensor id
    pub fn add_parse_errors<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = SensorId>,
    {
        self.add_for_sensors(ErrorCode::PARSE, ids);
    }

    /// Record a reply timeout for each sensor id
    pub fn add_timeout_errors<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = SensorId>,
    {
        self.add_for_sensors(ErrorCode::TIMEOUT, ids);
    }

    /// Record hub-reported `(code, address index)` faults
    pub fn add_device_errors<I>(&mut self, faults: I)
    where
        I: IntoIterator<Item = (ErrorCode, u8)>,
    {
        self.records.extend(
            faults
                .into_iter()
                .map(|(code, index)| ErrorRecord::new(code, ErrorTarget::AddressIndex(index))),
        );
    }

    /// Append every record of another response
    pub fn extend(&mut self, other: ErrorResponse) {
        self.records.extend(other.records);
    }

    /// Count records carrying the given code
    pub fn count_of(&self, code: ErrorCode) -> usize {
        self.records.iter().filter(|r| r.code == code).count()
    }

    fn add_for_sensors<I>(&mut self, code: ErrorCode, ids: I)
    where
        I: IntoIterator<Item = SensorId>,
    {
        self.records
            .extend(ids.into_iter().map(|id| ErrorRecord::for_sensor(code, id)));
    }
}

impl Extend<ErrorRecord> for ErrorResponse {
    fn extend<T: IntoIterator<Item = ErrorRecord>>(&mut self, iter: T) {
        self.records.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_response() {
        let response = ErrorResponse::new();
        assert!(response.is_empty());
        assert_eq!(response.len(), 0);
    }

    #[test]
    fn test_accumulates_in_order() {
        let mut response = ErrorResponse::new();
        response.add_timeout_errors([1, 2]);
        response.add_parse_errors(vec![3]);
        response.add_engineering_errors(Some(4));
        response.add_device_errors([(ErrorCode::UNIT_TIMEOUT, 2)]);

        assert!(!response.is_empty());
        assert_eq!(response.len(), 5);
        assert_eq!(response.count_of(ErrorCode::TIMEOUT), 2);
        assert_eq!(
            response.records()[2],
            ErrorRecord::for_sensor(ErrorCode::PARSE, 3)
        );
        assert_eq!(
            response.records()[4].target,
            ErrorTarget::AddressIndex(2)
        );
    }

    #[test]
    fn test_merge_responses() {
        let mut first = ErrorResponse::new();
        first.add_timeout_errors([10]);
        let mut second = ErrorResponse::new();
        second.add_engineering_errors([11, 12]);

        first.extend(second);
        assert_eq!(first.len(), 3);
        assert_eq!(first.count_of(ErrorCode::ENGINEERING), 2);
    }
}

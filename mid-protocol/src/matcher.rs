//! Matching a reply buffer against the command that produced it
//!
//! The hub answers one command with a buffer that may hold several packets:
//! an error list for the units that failed, followed by the readings packet
//! (with zeroed data for the failed units). Every packet is consumed until the
//! buffer is exhausted.

use crate::codec::{codec_for, PayloadCodec, RawUnit};
use crate::conversion::Conversion;
use crate::descriptor::CommandDescriptor;
use crate::error::{MidError, MidResult};
use crate::reply::{read_error_list, ReadingsHeader, ReplyReader};
use mid_core::{ErrorCode, ErrorResponse, Reading};

/// Everything extracted from one reply
#[derive(Debug, Default)]
pub struct CommandOutcome {
    /// Readings in unit order, placeholders included
    pub readings: Vec<Reading>,
    /// Error records for this command only
    pub errors: ErrorResponse,
    /// Raw unit fields of the accepted readings packet
    pub units: Vec<RawUnit>,
    /// Faults reported by the hub as `(code, 1-based address index)`
    pub faults: Vec<(ErrorCode, u8)>,
    /// Framing errors of packets that were skipped
    pub rejected: Vec<MidError>,
}

impl CommandOutcome {
    /// Check if a readings packet was accepted
    pub fn has_readings_packet(&self) -> bool {
        !self.units.is_empty()
    }
}

/// Interprets the reply to one command descriptor
pub struct ReplyMatcher<'d> {
    descriptor: &'d CommandDescriptor,
    codec: &'static dyn PayloadCodec,
}

impl<'d> ReplyMatcher<'d> {
    pub fn new(descriptor: &'d CommandDescriptor) -> Self {
        Self {
            descriptor,
            codec: codec_for(descriptor.command),
        }
    }

    /// Decode every packet of `reply`
    ///
    /// Framing errors and conversion failures become error records in the
    /// outcome. Only a packet that is neither a readings packet nor an error
    /// list aborts the whole reply with [`MidError::UnparsableReply`].
    pub fn process(&self, reply: &[u8], ctx: &mut Conversion<'_>) -> MidResult<CommandOutcome> {
        if reply.is_empty() {
            return Err(MidError::EmptyReply);
        }

        let mut reader = ReplyReader::new(reply);
        let mut outcome = CommandOutcome::default();

        while !reader.is_empty() {
            match ReadingsHeader::read(&mut reader) {
                Ok(header) => self.read_packet(&mut reader, header, ctx, &mut outcome),
                Err(MidError::NotReadingsReply(kind)) => match read_error_list(&mut reader) {
                    Ok(faults) => {
                        for (code, index) in &faults {
                            log::warn!(
                                "Hub reported {} for address #{} of {}",
                                code,
                                index,
                                self.descriptor
                            );
                        }
                        outcome.errors.add_device_errors(faults.iter().copied());
                        outcome.faults.extend(faults);
                    }
                    Err(e) => {
                        log::error!(
                            "Unparsable reply to {} (packet kind {}): {}",
                            self.descriptor,
                            kind,
                            e
                        );
                        return Err(MidError::UnparsableReply(format!(
                            "packet kind {} at offset {} in reply to {}",
                            kind,
                            reader.position(),
                            self.descriptor
                        )));
                    }
                },
                Err(e) => {
                    log::warn!("Truncated readings header for {}: {}", self.descriptor, e);
                    outcome.errors.add_parse_errors(self.descriptor.sensor_ids());
                    outcome.rejected.push(e);
                    break;
                }
            }
        }

        Ok(outcome)
    }

    fn read_packet(
        &self,
        reader: &mut ReplyReader<'_>,
        header: ReadingsHeader,
        ctx: &mut Conversion<'_>,
        outcome: &mut CommandOutcome,
    ) {
        let checked = header.check(
            self.descriptor.command_code(),
            self.descriptor.address_count(),
            self.codec.unit_size(),
        );
        let decoded = checked.and_then(|_| {
            self.descriptor
                .units
                .iter()
                .map(|unit| self.codec.decode_unit(unit.address, reader))
                .collect::<MidResult<Vec<_>>>()
        });

        let units = match decoded {
            Ok(units) => units,
            Err(e) => {
                log::warn!("Rejected readings packet for {}: {}", self.descriptor, e);
                outcome.errors.add_parse_errors(self.descriptor.sensor_ids());
                outcome.rejected.push(e);
                reader.seek(header.end());
                return;
            }
        };

        for (unit, raw) in self.descriptor.units.iter().zip(&units) {
            for result in self.codec.convert(unit, raw, ctx) {
                match result {
                    Ok(reading) => outcome.readings.push(reading),
                    Err(failure) => {
                        log::warn!("{} in {}", failure.error, self.descriptor);
                        outcome.readings.push(failure.placeholder(ctx.timestamp()));
                        outcome.errors.add_engineering_errors([failure.sensor_id]);
                    }
                }
            }
        }
        outcome.units = units;
    }
}

/// Values read back from a calibration get or set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalibrationReply {
    /// One signed value per address, in request order
    pub values: Vec<i64>,
    pub faults: Vec<(ErrorCode, u8)>,
}

/// Decode the reply to a calibration frame
///
/// The hub echoes the outer calibration code (64 or 65) in place of the unit
/// command code. Unlike readings, a framing error here is returned directly.
pub fn read_calibration_reply(
    reply: &[u8],
    echo_code: u8,
    address_count: usize,
    size: u8,
) -> MidResult<CalibrationReply> {
    if reply.is_empty() {
        return Err(MidError::EmptyReply);
    }

    let mut reader = ReplyReader::new(reply);
    let mut calibration = CalibrationReply::default();

    while !reader.is_empty() {
        match ReadingsHeader::read(&mut reader) {
            Ok(header) => {
                header.check(echo_code, address_count, size as usize)?;
                for _ in 0..address_count {
                    calibration.values.push(reader.read_int_le(size as usize)?);
                }
            }
            Err(MidError::NotReadingsReply(kind)) => {
                let faults = read_error_list(&mut reader).map_err(|e| {
                    MidError::UnparsableReply(format!(
                        "calibration reply packet kind {}: {}",
                        kind, e
                    ))
                })?;
                calibration.faults.extend(faults);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(calibration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::{MockFormulaEvaluator, SafeFormulaEvaluator, SmoothingWindows};
    use crate::descriptor::{ChannelConfig, UnitConfig};
    use crate::frame::{UnitCommand, GET_CALIBRATION};
    use chrono::Utc;
    use mid_core::{ErrorTarget, ReadingType};

    fn temp_hum_descriptor() -> CommandDescriptor {
        CommandDescriptor::new(
            UnitCommand::TempHum,
            1,
            vec![
                UnitConfig::new(1006)
                    .channel(ChannelConfig::new(1))
                    .channel(ChannelConfig::new(2)),
                UnitConfig::new(1007)
                    .channel(ChannelConfig::new(3))
                    .channel(ChannelConfig::new(4)),
            ],
        )
    }

    fn process(descriptor: &CommandDescriptor, reply: &[u8]) -> MidResult<CommandOutcome> {
        let evaluator = SafeFormulaEvaluator::new();
        let mut windows = SmoothingWindows::new();
        let mut ctx = Conversion::new(&evaluator, &mut windows, Utc::now());
        ReplyMatcher::new(descriptor).process(reply, &mut ctx)
    }

    const READINGS: [u8; 12] = [1, 9, 1, 2, 0x58, 0x02, 0x90, 0x01, 0x58, 0x02, 0x90, 0x01];

    #[test]
    fn test_readings_packet() {
        let outcome = process(&temp_hum_descriptor(), &READINGS).unwrap();
        assert_eq!(outcome.readings.len(), 4);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.units.len(), 2);
        assert_eq!(outcome.units[1].fields, vec![600, 400]);

        let temp = &outcome.readings[2];
        assert_eq!(temp.sensor_id, 3);
        assert_eq!(temp.kind, ReadingType::Temperature);
        assert!((temp.value.unwrap() - -29.4).abs() < 1e-9);
        assert_eq!(outcome.readings[3].raw, Some(400.0));
    }

    #[test]
    fn test_error_list_before_readings() {
        let mut reply = vec![4, 1, 4, 1];
        reply.extend_from_slice(&[1, 9, 1, 2, 0, 0, 0, 0, 0x58, 0x02, 0x90, 0x01]);

        let outcome = process(&temp_hum_descriptor(), &reply).unwrap();
        assert_eq!(outcome.faults, vec![(ErrorCode::UNIT_TIMEOUT, 1)]);
        assert_eq!(outcome.errors.records()[0].target, ErrorTarget::AddressIndex(1));
        assert_eq!(outcome.readings.len(), 4);
        assert_eq!(outcome.readings[0].error_code, Some(ErrorCode::DEFAULT_VALUE));
        assert!(outcome.readings[2].is_valid());
    }

    #[test]
    fn test_command_mismatch_is_rejected() {
        let mut reply = READINGS;
        reply[2] = 2;

        let outcome = process(&temp_hum_descriptor(), &reply).unwrap();
        assert!(outcome.readings.is_empty());
        assert!(!outcome.has_readings_packet());
        assert!(matches!(
            outcome.rejected[0],
            MidError::ReplyCommandMismatch {
                sent: 1,
                received: 2
            }
        ));
        assert_eq!(outcome.errors.count_of(ErrorCode::PARSE), 4);
    }

    #[test]
    fn test_size_mismatch_skips_packet() {
        // declares 3 units of a 2 unit command, then a good error list
        let mut reply = vec![1, 13, 1, 3];
        reply.extend_from_slice(&[0; 12]);
        reply.extend_from_slice(&[4, 1, 6, 2]);

        let outcome = process(&temp_hum_descriptor(), &reply).unwrap();
        assert!(matches!(
            outcome.rejected[0],
            MidError::ReplyAddressCountMismatch { sent: 2, received: 3 }
        ));
        assert_eq!(outcome.faults, vec![(ErrorCode::BAD_CRC, 2)]);
    }

    #[test]
    fn test_truncated_payload() {
        let outcome = process(&temp_hum_descriptor(), &READINGS[..10]).unwrap();
        assert!(outcome.readings.is_empty());
        assert!(matches!(outcome.rejected[0], MidError::ReplyParse(_)));
        assert_eq!(outcome.errors.count_of(ErrorCode::PARSE), 4);
    }

    #[test]
    fn test_unparsable_reply() {
        assert!(matches!(
            process(&temp_hum_descriptor(), &[3, 124, 0]),
            Err(MidError::UnparsableReply(_))
        ));
        assert!(matches!(
            process(&temp_hum_descriptor(), &[]),
            Err(MidError::EmptyReply)
        ));
    }

    #[test]
    fn test_conversion_failure_is_per_channel() {
        let descriptor = CommandDescriptor::new(
            UnitCommand::Wind,
            2,
            vec![
                UnitConfig::new(1).channel(ChannelConfig::new(20).with_formula("bad")),
                UnitConfig::new(2).channel(ChannelConfig::new(21).with_formula("good")),
            ],
        );
        let mut evaluator = MockFormulaEvaluator::new();
        evaluator.expect_evaluate().returning(|formula, x, _| {
            if formula == "bad" {
                Err(MidError::FormulaEvaluation {
                    formula: formula.to_string(),
                    cause: "unknown".to_string(),
                })
            } else {
                Ok(x * 2.0)
            }
        });
        let mut windows = SmoothingWindows::new();
        let mut ctx = Conversion::new(&evaluator, &mut windows, Utc::now());

        let reply = [1, 5, 2, 2, 10, 0, 20, 0];
        let outcome = ReplyMatcher::new(&descriptor)
            .process(&reply, &mut ctx)
            .unwrap();

        assert_eq!(outcome.readings.len(), 2);
        assert_eq!(outcome.readings[0].error_code, Some(ErrorCode::ENGINEERING));
        assert_eq!(outcome.readings[1].value, Some(40.0));
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors.records()[0].target, ErrorTarget::Sensor(20));
    }

    #[test]
    fn test_calibration_reply() {
        let reply = [1, 9, GET_CALIBRATION, 2, 0xFE, 0xFF, 0xFF, 0xFF, 0x10, 0, 0, 0];
        let calibration = read_calibration_reply(&reply, GET_CALIBRATION, 2, 4).unwrap();
        assert_eq!(calibration.values, vec![-2, 16]);
        assert!(calibration.faults.is_empty());

        assert!(matches!(
            read_calibration_reply(&reply, GET_CALIBRATION, 2, 2),
            Err(MidError::ReplySize { .. })
        ));
    }
}

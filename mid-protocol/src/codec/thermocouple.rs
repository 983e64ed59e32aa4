//! Dual thermocouple units

use super::{convert_channel, ChannelResult, PayloadCodec, RawUnit};
use crate::conversion::Conversion;
use crate::descriptor::UnitConfig;
use mid_core::ReadingType;

/// Two 16-bit words per unit, one per thermocouple input
///
/// Each input has its own formula and bias. An input without a sensor id is
/// not wired and produces nothing.
#[derive(Debug, Clone, Copy)]
pub struct ThermocoupleCodec;

impl PayloadCodec for ThermocoupleCodec {
    fn field_widths(&self) -> &'static [usize] {
        &[2, 2]
    }

    fn convert(
        &self,
        unit: &UnitConfig,
        raw: &RawUnit,
        ctx: &mut Conversion<'_>,
    ) -> Vec<ChannelResult> {
        let kinds = [ReadingType::ThermocoupleA, ReadingType::ThermocoupleB];
        unit.channels
            .iter()
            .zip(kinds)
            .enumerate()
            .filter_map(|(i, (channel, kind))| {
                let value = raw.field(i).unwrap_or(0) as f64;
                convert_channel(ctx, channel, kind, value, 0.0, None)
            })
            .collect()
    }
}

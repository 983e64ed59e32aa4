//! Differential pressure units

use super::{convert_channel, zero_reading, ChannelResult, PayloadCodec, RawUnit};
use crate::conversion::Conversion;
use crate::descriptor::UnitConfig;
use mid_core::ReadingType;

/// Narrow-range transducer output in kPa
pub fn narrow_pressure_kpa(raw: f64) -> f64 {
    0.0022888 * raw + 50.0
}

fn convert_single(
    unit: &UnitConfig,
    raw: &RawUnit,
    ctx: &mut Conversion<'_>,
    kind: ReadingType,
    builtin: Option<&dyn Fn(f64, f64) -> f64>,
) -> Vec<ChannelResult> {
    let Some(channel) = unit.channels.first() else {
        return Vec::new();
    };
    // the hub zeroes the payload of units that did not answer
    let value = raw.field(0).unwrap_or(0);
    let result = if value == 0 {
        zero_reading(ctx, channel, kind)
    } else {
        convert_channel(ctx, channel, kind, value as f64, 0.0, builtin)
    };
    result.into_iter().collect()
}

/// One 16-bit word per unit
#[derive(Debug, Clone, Copy)]
pub struct PressureNarrowCodec;

impl PayloadCodec for PressureNarrowCodec {
    fn field_widths(&self) -> &'static [usize] {
        &[2]
    }

    fn convert(
        &self,
        unit: &UnitConfig,
        raw: &RawUnit,
        ctx: &mut Conversion<'_>,
    ) -> Vec<ChannelResult> {
        let builtin = |x: f64, _t: f64| narrow_pressure_kpa(x);
        convert_single(unit, raw, ctx, ReadingType::Pressure, Some(&builtin))
    }
}

/// One 32-bit word per unit, converted by the channel formula only
#[derive(Debug, Clone, Copy)]
pub struct PressureWideCodec;

impl PayloadCodec for PressureWideCodec {
    fn field_widths(&self) -> &'static [usize] {
        &[4]
    }

    fn convert(
        &self,
        unit: &UnitConfig,
        raw: &RawUnit,
        ctx: &mut Conversion<'_>,
    ) -> Vec<ChannelResult> {
        convert_single(unit, raw, ctx, ReadingType::PressureWide, None)
    }
}

//! Single-word units: anemometer, tachometer and the unit version query

use super::{convert_channel, zero_reading, ChannelResult, PayloadCodec, RawUnit};
use crate::conversion::Conversion;
use crate::descriptor::UnitConfig;
use mid_core::ReadingType;

fn convert_word(
    unit: &UnitConfig,
    raw: &RawUnit,
    ctx: &mut Conversion<'_>,
    kind: ReadingType,
) -> Vec<ChannelResult> {
    let Some(channel) = unit.channels.first() else {
        return Vec::new();
    };
    let value = raw.field(0).unwrap_or(0);
    if value == 0 {
        return zero_reading(ctx, channel, kind).into_iter().collect();
    }
    convert_channel(ctx, channel, kind, value as f64, 0.0, None)
        .into_iter()
        .collect()
}

/// Wind speed; the formula maps pulse counts to velocity
#[derive(Debug, Clone, Copy)]
pub struct WindCodec;

impl PayloadCodec for WindCodec {
    fn field_widths(&self) -> &'static [usize] {
        &[2]
    }

    fn convert(
        &self,
        unit: &UnitConfig,
        raw: &RawUnit,
        ctx: &mut Conversion<'_>,
    ) -> Vec<ChannelResult> {
        convert_word(unit, raw, ctx, ReadingType::Wind)
    }
}

/// Fan speed; the unit already reports RPM
#[derive(Debug, Clone, Copy)]
pub struct TachCodec;

impl PayloadCodec for TachCodec {
    fn field_widths(&self) -> &'static [usize] {
        &[2]
    }

    fn convert(
        &self,
        unit: &UnitConfig,
        raw: &RawUnit,
        ctx: &mut Conversion<'_>,
    ) -> Vec<ChannelResult> {
        convert_word(unit, raw, ctx, ReadingType::Tach)
    }
}

/// Firmware version word; 0 when the unit did not answer
#[derive(Debug, Clone, Copy)]
pub struct UnitVersionCodec;

impl PayloadCodec for UnitVersionCodec {
    fn field_widths(&self) -> &'static [usize] {
        &[2]
    }
}

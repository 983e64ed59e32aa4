//! Payload codecs, one per unit command
//!
//! A codec knows the raw field layout a unit contributes to a readings packet
//! and how each field becomes an engineering reading. Conversion failures are
//! reported per channel so one bad formula never hides the other channels of
//! the same reply.

mod multipoint;
mod pressure;
mod simple;
mod temp_hum;
mod thermocouple;

pub use multipoint::{
    ds18b20_fahrenheit, MultiPointAddressCodec, MultiPointReadCodec, MultiPointResetCodec,
    EMPTY_SLOT,
};
pub use pressure::{narrow_pressure_kpa, PressureNarrowCodec, PressureWideCodec};
pub use simple::{TachCodec, UnitVersionCodec, WindCodec};
pub use temp_hum::{sht_humidity, sht_temperature, TempHumCodec, DEFAULT_TEMPERATURE_LIMIT};
pub use thermocouple::ThermocoupleCodec;

use crate::conversion::Conversion;
use crate::descriptor::{ChannelConfig, UnitConfig};
use crate::error::{MidError, MidResult};
use crate::frame::UnitCommand;
use crate::reply::ReplyReader;
use chrono::{DateTime, Utc};
use mid_core::{ErrorCode, Reading, ReadingType, SensorId};

/// Raw fields of one unit in a readings packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawUnit {
    pub address: u16,
    pub fields: Vec<u64>,
}

impl RawUnit {
    pub fn field(&self, index: usize) -> Option<u64> {
        self.fields.get(index).copied()
    }
}

/// A channel whose engineering conversion failed
#[derive(Debug)]
pub struct ConversionFailure {
    pub sensor_id: SensorId,
    pub kind: ReadingType,
    pub raw: f64,
    pub error: MidError,
}

impl ConversionFailure {
    /// Reading reported in place of the failed value
    pub fn placeholder(&self, timestamp: DateTime<Utc>) -> Reading {
        Reading::failed(
            self.sensor_id,
            self.kind,
            Some(self.raw),
            ErrorCode::ENGINEERING,
            timestamp,
        )
    }
}

/// Outcome of converting one channel
pub type ChannelResult = Result<Reading, ConversionFailure>;

/// Decoding and conversion rules for one unit command
pub trait PayloadCodec: Send + Sync {
    /// Width in bytes of each raw field, in wire order
    fn field_widths(&self) -> &'static [usize];

    /// Bytes one unit contributes to a readings packet
    fn unit_size(&self) -> usize {
        self.field_widths().iter().sum()
    }

    /// Read the raw fields of one unit (little-endian)
    fn decode_unit(&self, address: u16, reader: &mut ReplyReader<'_>) -> MidResult<RawUnit> {
        let fields = self
            .field_widths()
            .iter()
            .map(|&width| reader.read_uint_le(width))
            .collect::<MidResult<Vec<_>>>()?;
        Ok(RawUnit { address, fields })
    }

    /// Produce the readings of one unit
    ///
    /// Codecs without sensor channels return nothing; their raw fields are
    /// consumed by whoever issued the command.
    fn convert(
        &self,
        _unit: &UnitConfig,
        _raw: &RawUnit,
        _ctx: &mut Conversion<'_>,
    ) -> Vec<ChannelResult> {
        Vec::new()
    }
}

static TEMP_HUM: TempHumCodec = TempHumCodec;
static WIND: WindCodec = WindCodec;
static TACH: TachCodec = TachCodec;
static THERMOCOUPLE: ThermocoupleCodec = ThermocoupleCodec;
static PRESSURE_NARROW: PressureNarrowCodec = PressureNarrowCodec;
static PRESSURE_WIDE: PressureWideCodec = PressureWideCodec;
static MULTI_POINT_RESET: MultiPointResetCodec = MultiPointResetCodec;
static MULTI_POINT_READ: MultiPointReadCodec = MultiPointReadCodec;
static MULTI_POINT_ADDRESS: MultiPointAddressCodec = MultiPointAddressCodec;
static UNIT_VERSION: UnitVersionCodec = UnitVersionCodec;

/// Select the codec for a unit command
pub fn codec_for(command: UnitCommand) -> &'static dyn PayloadCodec {
    match command {
        UnitCommand::TempHum => &TEMP_HUM,
        UnitCommand::Wind => &WIND,
        UnitCommand::Tach => &TACH,
        UnitCommand::Thermocouple => &THERMOCOUPLE,
        UnitCommand::PressureNarrow => &PRESSURE_NARROW,
        UnitCommand::PressureWide => &PRESSURE_WIDE,
        UnitCommand::MultiPointReset => &MULTI_POINT_RESET,
        UnitCommand::MultiPointRead(_) => &MULTI_POINT_READ,
        UnitCommand::MultiPointAddress(_) => &MULTI_POINT_ADDRESS,
        UnitCommand::UnitVersion => &UNIT_VERSION,
    }
}

/// Convert one channel; `None` when the channel has no sensor id
pub(crate) fn convert_channel(
    ctx: &mut Conversion<'_>,
    channel: &ChannelConfig,
    kind: ReadingType,
    raw: f64,
    t: f64,
    builtin: Option<&dyn Fn(f64, f64) -> f64>,
) -> Option<ChannelResult> {
    let sensor_id = channel.sensor_id?;
    let result = match ctx.apply(channel, raw, t, builtin) {
        Ok(value) => Ok(Reading::new(sensor_id, kind, value, raw, ctx.timestamp())),
        Err(e) => Err(ConversionFailure {
            sensor_id,
            kind,
            raw,
            error: MidError::EngineeringConversion {
                sensor_id,
                cause: e.to_string(),
            },
        }),
    };
    Some(result)
}

/// Reading for a unit that answered with an all-zero field
pub(crate) fn zero_reading(
    ctx: &Conversion<'_>,
    channel: &ChannelConfig,
    kind: ReadingType,
) -> Option<ChannelResult> {
    let sensor_id = channel.sensor_id?;
    Some(Ok(Reading::failed(
        sensor_id,
        kind,
        Some(0.0),
        ErrorCode::DEFAULT_VALUE,
        ctx.timestamp(),
    )))
}

//! Temperature / relative humidity units (SHT sensor)

use super::{
    convert_channel, zero_reading, ChannelResult, ConversionFailure, PayloadCodec, RawUnit,
};
use crate::conversion::Conversion;
use crate::descriptor::UnitConfig;
use crate::error::MidError;
use mid_core::{ErrorCode, Reading, ReadingType};

/// Temperatures below this (°F) are the sensor's power-on default
pub const DEFAULT_TEMPERATURE_LIMIT: f64 = -39.0;

/// SHT temperature in °F
pub fn sht_temperature(raw: f64) -> f64 {
    -40.2 + 0.018 * raw
}

/// SHT relative humidity, temperature compensated with `t` in °F
pub fn sht_humidity(raw: f64, t: f64) -> f64 {
    let linear = -2.0468 + 0.0367 * raw - 1.5955e-6 * raw * raw;
    ((t - 32.0) / 1.8 - 25.0) * (0.01 + 0.00008 * raw) + linear
}

/// Two 16-bit words per unit: temperature then humidity
#[derive(Debug, Clone, Copy)]
pub struct TempHumCodec;

impl PayloadCodec for TempHumCodec {
    fn field_widths(&self) -> &'static [usize] {
        &[2, 2]
    }

    fn convert(
        &self,
        unit: &UnitConfig,
        raw: &RawUnit,
        ctx: &mut Conversion<'_>,
    ) -> Vec<ChannelResult> {
        let (Some(temp_channel), Some(hum_channel)) = (unit.channels.first(), unit.channels.get(1))
        else {
            return Vec::new();
        };
        let raw_temp = raw.field(0).unwrap_or(0) as f64;
        let raw_hum = raw.field(1).unwrap_or(0) as f64;

        if raw_temp == 0.0 {
            return [
                zero_reading(ctx, temp_channel, ReadingType::Temperature),
                zero_reading(ctx, hum_channel, ReadingType::Humidity),
            ]
            .into_iter()
            .flatten()
            .collect();
        }

        let temperature = |x: f64, _t: f64| sht_temperature(x);
        let humidity = |x: f64, t: f64| sht_humidity(x, t);

        let temp_result = ctx.apply(temp_channel, raw_temp, 0.0, Some(&temperature));
        let mut results: Vec<ChannelResult> = Vec::with_capacity(2);

        match temp_result {
            Ok(t) => {
                if let Some(id) = temp_channel.sensor_id {
                    results.push(Ok(Reading::new(
                        id,
                        ReadingType::Temperature,
                        t,
                        raw_temp,
                        ctx.timestamp(),
                    )));
                }
                results.extend(convert_channel(
                    ctx,
                    hum_channel,
                    ReadingType::Humidity,
                    raw_hum,
                    t,
                    Some(&humidity),
                ));

                if t < DEFAULT_TEMPERATURE_LIMIT {
                    log::info!(
                        "default value returned by SHT unit {} (temperature {:.1})",
                        raw.address,
                        t
                    );
                    for reading in results.iter_mut().flatten() {
                        reading.error_code = Some(ErrorCode::DEFAULT_VALUE);
                    }
                }
            }
            Err(e) => {
                // humidity is compensated with the temperature, so both go
                for (channel, kind, raw_value) in [
                    (temp_channel, ReadingType::Temperature, raw_temp),
                    (hum_channel, ReadingType::Humidity, raw_hum),
                ] {
                    if let Some(sensor_id) = channel.sensor_id {
                        results.push(Err(ConversionFailure {
                            sensor_id,
                            kind,
                            raw: raw_value,
                            error: MidError::EngineeringConversion {
                                sensor_id,
                                cause: e.to_string(),
                            },
                        }));
                    }
                }
            }
        }

        results
    }
}

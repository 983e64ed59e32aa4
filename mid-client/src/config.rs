//! Sensor configuration records as served by the collection server
//!
//! The server sends a `commandInfo` array with one record per installed
//! sensor, tagged by `"type"`. Records of types this hub link does not read
//! are kept as [`SensorRecord::Other`] and ignored by the planner.

use crate::error::{MidError, MidResult};
use mid_core::SensorId;
use mid_protocol::{ChannelConfig, UnitCommand, UnitConfig};
use serde::{Deserialize, Deserializer};

/// Top-level configuration document
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    #[serde(rename = "commandInfo", default)]
    pub command_info: Vec<SensorRecord>,
}

impl HubConfig {
    /// Parse the configuration JSON
    pub fn from_json(json: &str) -> MidResult<Self> {
        serde_json::from_str(json).map_err(|e| MidError::Config(e.to_string()))
    }
}

/// One configured sensor
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum SensorRecord {
    #[serde(rename = "temp_rh")]
    TempHum(TempHumRecord),
    #[serde(rename = "wind")]
    Wind(SingleRecord),
    #[serde(rename = "tach")]
    Tach(SingleRecord),
    #[serde(rename = "TC")]
    Thermocouple(ThermocoupleRecord),
    #[serde(rename = "pressure")]
    PressureWide(SingleRecord),
    #[serde(rename = "pressure_narrow")]
    PressureNarrow(SingleRecord),
    #[serde(rename = "MP_T")]
    MultiPoint(MultiPointRecord),
    #[serde(other)]
    Other,
}

impl SensorRecord {
    /// Port the unit hangs off, if this is a hub sensor
    pub fn port(&self) -> Option<u8> {
        match self {
            SensorRecord::TempHum(r) => Some(r.port),
            SensorRecord::Wind(r)
            | SensorRecord::Tach(r)
            | SensorRecord::PressureWide(r)
            | SensorRecord::PressureNarrow(r) => Some(r.port),
            SensorRecord::Thermocouple(r) => Some(r.port),
            SensorRecord::MultiPoint(r) => Some(r.port),
            SensorRecord::Other => None,
        }
    }

    /// Command, port and unit of sensors read by one plain hub command
    pub fn unit(&self) -> Option<(UnitCommand, u8, UnitConfig)> {
        let (command, port, address, channels) = match self {
            SensorRecord::TempHum(r) => (UnitCommand::TempHum, r.port, r.address, r.channels()),
            SensorRecord::Wind(r) => (UnitCommand::Wind, r.port, r.address, r.channels()),
            SensorRecord::Tach(r) => (UnitCommand::Tach, r.port, r.address, r.channels()),
            SensorRecord::Thermocouple(r) => {
                (UnitCommand::Thermocouple, r.port, r.address, r.channels())
            }
            SensorRecord::PressureWide(r) => {
                (UnitCommand::PressureWide, r.port, r.address, r.channels())
            }
            SensorRecord::PressureNarrow(r) => {
                (UnitCommand::PressureNarrow, r.port, r.address, r.channels())
            }
            SensorRecord::MultiPoint(_) | SensorRecord::Other => return None,
        };
        Some((command, port, UnitConfig::with_channels(address, channels)))
    }
}

/// Temperature / humidity unit: two sensors behind one address
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TempHumRecord {
    pub temp_id: SensorId,
    pub rh_id: SensorId,
    pub port: u8,
    #[serde(rename = "addy")]
    pub address: u16,
    #[serde(default)]
    pub temp_convert: Option<String>,
    #[serde(default)]
    pub rh_convert: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub temp_bias: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub rh_bias: f64,
    #[serde(default)]
    pub smooth: bool,
}

impl TempHumRecord {
    pub fn channels(&self) -> Vec<ChannelConfig> {
        vec![
            channel(Some(self.temp_id), &self.temp_convert, self.temp_bias, self.smooth),
            channel(Some(self.rh_id), &self.rh_convert, self.rh_bias, self.smooth),
        ]
    }
}

/// Unit with a single sensor (wind, tach, pressure)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SingleRecord {
    pub sensor_id: SensorId,
    pub port: u8,
    #[serde(rename = "addy")]
    pub address: u16,
    #[serde(default)]
    pub convert: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub bias: f64,
    #[serde(default)]
    pub smooth: bool,
}

impl SingleRecord {
    pub fn channels(&self) -> Vec<ChannelConfig> {
        vec![channel(Some(self.sensor_id), &self.convert, self.bias, self.smooth)]
    }
}

/// Dual thermocouple unit; either input may be unused
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ThermocoupleRecord {
    #[serde(rename = "A_id", default)]
    pub a_id: Option<SensorId>,
    #[serde(rename = "B_id", default)]
    pub b_id: Option<SensorId>,
    pub port: u8,
    #[serde(rename = "addy")]
    pub address: u16,
    #[serde(rename = "A_convert", default)]
    pub a_convert: Option<String>,
    #[serde(rename = "B_convert", default)]
    pub b_convert: Option<String>,
    #[serde(rename = "A_bias", default, deserialize_with = "lenient_f64")]
    pub a_bias: f64,
    #[serde(rename = "B_bias", default, deserialize_with = "lenient_f64")]
    pub b_bias: f64,
}

impl ThermocoupleRecord {
    pub fn channels(&self) -> Vec<ChannelConfig> {
        vec![
            channel(self.a_id.filter(|&id| id != 0), &self.a_convert, self.a_bias, false),
            channel(self.b_id.filter(|&id| id != 0), &self.b_convert, self.b_bias, false),
        ]
    }
}

/// One probe on a multi-point cable
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MultiPointRecord {
    pub sensor_id: SensorId,
    pub port: u8,
    #[serde(rename = "addy")]
    pub address: u16,
    /// JSON document `{"ch": n, "addrs": ["hex", ...]}` embedded as a string
    #[serde(default)]
    pub sensor_extra_info: Option<String>,
}

/// Decoded `sensor_extra_info` of a multi-point probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiPointExtra {
    pub channel: u8,
    /// Bus addresses this sensor id may answer from; empty when not assigned
    pub bus_addresses: Vec<u64>,
}

#[derive(Deserialize)]
struct RawExtra {
    ch: u8,
    #[serde(default)]
    addrs: Vec<String>,
}

impl MultiPointRecord {
    /// Decode the embedded extra info; `Ok(None)` when it is absent or empty
    pub fn extra(&self) -> MidResult<Option<MultiPointExtra>> {
        let text = match self.sensor_extra_info.as_deref().map(str::trim) {
            None | Some("") => return Ok(None),
            Some(text) => text,
        };
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| MidError::Config(format!("sensor {} extra info: {}", self.sensor_id, e)))?;
        if value.is_null() || value.as_object().is_some_and(|o| o.is_empty()) {
            return Ok(None);
        }

        let raw: RawExtra = serde_json::from_value(value)
            .map_err(|e| MidError::Config(format!("sensor {} extra info: {}", self.sensor_id, e)))?;
        let bus_addresses = raw
            .addrs
            .iter()
            .map(String::as_str)
            .map(parse_bus_address)
            .collect::<MidResult<Vec<_>>>()?;
        Ok(Some(MultiPointExtra {
            channel: raw.ch,
            bus_addresses,
        }))
    }
}

/// Parse a hex bus address, with or without a `0x` prefix
pub fn parse_bus_address(text: &str) -> MidResult<u64> {
    let digits = text
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    u64::from_str_radix(digits, 16)
        .map_err(|e| MidError::Config(format!("bad bus address '{}': {}", text, e)))
}

fn channel(
    sensor_id: Option<SensorId>,
    formula: &Option<String>,
    bias: f64,
    smooth: bool,
) -> ChannelConfig {
    let mut config = match sensor_id {
        Some(id) => ChannelConfig::new(id),
        None => ChannelConfig::unassigned(),
    }
    .with_bias(bias);
    if let Some(formula) = formula {
        config = config.with_formula(formula.as_str());
    }
    if smooth {
        config = config.smoothed();
    }
    config
}

/// Biases arrive as numbers, numeric strings or null
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Number(f64),
        Text(String),
        Null(Option<()>),
    }

    match Lenient::deserialize(deserializer)? {
        Lenient::Number(n) => Ok(n),
        Lenient::Text(s) if s.trim().is_empty() => Ok(0.0),
        Lenient::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
        Lenient::Null(_) => Ok(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "commandInfo": [
            {"type": "temp_rh", "temp_id": 10, "rh_id": 11, "port": 1, "addy": 1007,
             "temp_convert": "", "rh_convert": "x", "temp_bias": "0.5", "rh_bias": 0},
            {"type": "wind", "sensor_id": 20, "port": 2, "addy": 3, "convert": "x*0.1", "bias": null},
            {"type": "TC", "A_id": 30, "B_id": null, "port": 3, "addy": 4,
             "A_convert": "x/4", "B_convert": "", "A_bias": 0, "B_bias": 0},
            {"type": "MP_T", "sensor_id": 40, "port": 4, "addy": 9,
             "sensor_extra_info": "{\"ch\": 2, \"addrs\": [\"28FF0011AA\", \"0x28ff0022bb\"]}"},
            {"type": "VFD", "device_type_id": 3}
        ]
    }"#;

    #[test]
    fn test_parse_command_info() {
        let config = HubConfig::from_json(CONFIG).unwrap();
        assert_eq!(config.command_info.len(), 5);
        assert_eq!(config.command_info[4], SensorRecord::Other);

        let SensorRecord::TempHum(trh) = &config.command_info[0] else {
            panic!("expected temp_rh record");
        };
        let channels = trh.channels();
        assert_eq!(channels[0].bias, 0.5);
        assert!(channels[0].formula.is_none());
        assert_eq!(channels[1].formula.as_deref(), Some("x"));

        let SensorRecord::Wind(wind) = &config.command_info[1] else {
            panic!("expected wind record");
        };
        assert_eq!(wind.bias, 0.0);
        assert_eq!(wind.port, 2);
    }

    #[test]
    fn test_thermocouple_unused_input() {
        let config = HubConfig::from_json(CONFIG).unwrap();
        let SensorRecord::Thermocouple(tc) = &config.command_info[2] else {
            panic!("expected TC record");
        };
        let channels = tc.channels();
        assert_eq!(channels[0].sensor_id, Some(30));
        assert_eq!(channels[1].sensor_id, None);
    }

    #[test]
    fn test_multi_point_extra() {
        let config = HubConfig::from_json(CONFIG).unwrap();
        let SensorRecord::MultiPoint(mp) = &config.command_info[3] else {
            panic!("expected MP_T record");
        };
        let extra = mp.extra().unwrap().unwrap();
        assert_eq!(extra.channel, 2);
        assert_eq!(extra.bus_addresses, vec![0x28FF0011AA, 0x28FF0022BB]);

        let empty = MultiPointRecord {
            sensor_id: 1,
            port: 1,
            address: 1,
            sensor_extra_info: Some("{}".to_string()),
        };
        assert_eq!(empty.extra().unwrap(), None);
    }

    #[test]
    fn test_bad_config() {
        assert!(matches!(
            HubConfig::from_json("{\"commandInfo\": 3}"),
            Err(MidError::Config(_))
        ));
        assert!(parse_bus_address("zz").is_err());
    }
}

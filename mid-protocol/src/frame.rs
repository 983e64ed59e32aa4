//! Request frames sent from the MID to the hub
//!
//! Every frame starts with the `DERV` magic followed by an outer command code.
//! Sensor readings are normally requested through the general wrapper (25),
//! which carries the unit command code and the per-unit payload size so the
//! hub can relay commands it does not know about itself.

use crate::error::{MidError, MidResult};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Magic marker prefixing every outbound frame
pub const MAGIC: &[u8; 4] = b"DERV";

/// Outer code of the general unit command wrapper
pub const GENERAL_COMMAND: u8 = 25;
/// Outer code for reading a unit calibration value
pub const GET_CALIBRATION: u8 = 64;
/// Outer code for writing a unit calibration value
pub const SET_CALIBRATION: u8 = 65;
/// Outer code of the hub ping
pub const PING: u8 = 130;
/// Outer code of the hub firmware version query
pub const HUB_VERSION: u8 = 150;

/// Maximum number of unit addresses in one command
pub const MAX_ADDRESSES: usize = 32;
/// Number of physical ports on the hub, numbered from 1
pub const PORT_COUNT: u8 = 6;
/// Number of multi-point channels on a unit, numbered from 1
pub const MULTI_POINT_CHANNELS: u8 = 4;

/// Length of the general wrapper without addresses
pub const GENERAL_HEADER_LEN: usize = 9;

/// Command understood by a field unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnitCommand {
    TempHum,
    Wind,
    Tach,
    Thermocouple,
    PressureNarrow,
    PressureWide,
    MultiPointReset,
    /// Read the temperature of the next device on a multi-point channel
    MultiPointRead(u8),
    /// Read the bus address of the next device on a multi-point channel
    MultiPointAddress(u8),
    UnitVersion,
}

impl UnitCommand {
    /// Get the command code sent on the wire
    pub fn code(&self) -> u8 {
        match self {
            UnitCommand::TempHum => 1,
            UnitCommand::Wind => 2,
            UnitCommand::Tach => 3,
            UnitCommand::Thermocouple => 6,
            UnitCommand::PressureNarrow => 7,
            UnitCommand::PressureWide => 8,
            UnitCommand::MultiPointReset => 9,
            UnitCommand::MultiPointRead(channel) => 9 + channel,
            UnitCommand::MultiPointAddress(channel) => 13 + channel,
            UnitCommand::UnitVersion => 63,
        }
    }

    /// Parse a unit command code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(UnitCommand::TempHum),
            2 => Some(UnitCommand::Wind),
            3 => Some(UnitCommand::Tach),
            6 => Some(UnitCommand::Thermocouple),
            7 => Some(UnitCommand::PressureNarrow),
            8 => Some(UnitCommand::PressureWide),
            9 => Some(UnitCommand::MultiPointReset),
            10..=13 => Some(UnitCommand::MultiPointRead(code - 9)),
            14..=17 => Some(UnitCommand::MultiPointAddress(code - 13)),
            63 => Some(UnitCommand::UnitVersion),
            _ => None,
        }
    }

    /// Bytes each unit contributes to a readings reply
    pub fn payload_size(&self) -> u8 {
        match self {
            UnitCommand::TempHum => 4,
            UnitCommand::Wind => 2,
            UnitCommand::Tach => 2,
            UnitCommand::Thermocouple => 4,
            UnitCommand::PressureNarrow => 2,
            UnitCommand::PressureWide => 4,
            UnitCommand::MultiPointReset => 1,
            UnitCommand::MultiPointRead(_) => 2,
            UnitCommand::MultiPointAddress(_) => 8,
            UnitCommand::UnitVersion => 2,
        }
    }

    /// Number of sensor channels configured per unit address
    pub fn channel_count(&self) -> usize {
        match self {
            UnitCommand::TempHum | UnitCommand::Thermocouple => 2,
            UnitCommand::Wind
            | UnitCommand::Tach
            | UnitCommand::PressureNarrow
            | UnitCommand::PressureWide => 1,
            UnitCommand::MultiPointReset
            | UnitCommand::MultiPointRead(_)
            | UnitCommand::MultiPointAddress(_)
            | UnitCommand::UnitVersion => 0,
        }
    }

    /// Width of the signed calibration value the unit stores
    pub fn calibration_size(&self) -> u8 {
        match self {
            UnitCommand::PressureWide => 4,
            _ => 2,
        }
    }

    /// Check if the hub also accepts this command as a legacy direct frame
    pub fn has_direct_frame(&self) -> bool {
        matches!(
            self,
            UnitCommand::TempHum
                | UnitCommand::Wind
                | UnitCommand::Tach
                | UnitCommand::Thermocouple
                | UnitCommand::PressureNarrow
        )
    }

    /// Get the multi-point channel, if any
    pub fn channel(&self) -> Option<u8> {
        match self {
            UnitCommand::MultiPointRead(channel) | UnitCommand::MultiPointAddress(channel) => {
                Some(*channel)
            }
            _ => None,
        }
    }

    /// Validate the channel number of multi-point commands
    pub fn validate(&self) -> MidResult<()> {
        match self.channel() {
            Some(channel) if channel == 0 || channel > MULTI_POINT_CHANNELS => Err(
                MidError::Encoding(format!(
                    "Multi-point channel {} out of range 1..={}",
                    channel, MULTI_POINT_CHANNELS
                )),
            ),
            _ => Ok(()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            UnitCommand::TempHum => "temp/humidity",
            UnitCommand::Wind => "wind",
            UnitCommand::Tach => "tach",
            UnitCommand::Thermocouple => "thermocouple",
            UnitCommand::PressureNarrow => "pressure",
            UnitCommand::PressureWide => "pressure wide",
            UnitCommand::MultiPointReset => "multi-point reset",
            UnitCommand::MultiPointRead(_) => "multi-point read",
            UnitCommand::MultiPointAddress(_) => "multi-point address",
            UnitCommand::UnitVersion => "unit version",
        }
    }
}

impl fmt::Display for UnitCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.channel() {
            Some(channel) => write!(f, "{} ch{} ({})", self.name(), channel, self.code()),
            None => write!(f, "{} ({})", self.name(), self.code()),
        }
    }
}

/// An outbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestFrame {
    /// `25 code size port n [addr]*`
    General {
        command: UnitCommand,
        port: u8,
        addresses: Vec<u16>,
    },
    /// `code port n [addr]*`
    Direct {
        command: UnitCommand,
        port: u8,
        addresses: Vec<u16>,
    },
    /// `64 code calSize port n [addr]*`
    GetCalibration {
        command: UnitCommand,
        size: u8,
        port: u8,
        addresses: Vec<u16>,
    },
    /// `65 code calSize port addr value`
    SetCalibration {
        command: UnitCommand,
        size: u8,
        port: u8,
        address: u16,
        value: i64,
    },
    /// `130 nonce`
    Ping { nonce: u16 },
    /// `150 nonce`
    HubVersion { nonce: u16 },
}

impl RequestFrame {
    /// Create a general wrapper frame
    pub fn general(command: UnitCommand, port: u8, addresses: Vec<u16>) -> Self {
        RequestFrame::General {
            command,
            port,
            addresses,
        }
    }

    /// Get the outer command code
    pub fn outer_code(&self) -> u8 {
        match self {
            RequestFrame::General { .. } => GENERAL_COMMAND,
            RequestFrame::Direct { command, .. } => command.code(),
            RequestFrame::GetCalibration { .. } => GET_CALIBRATION,
            RequestFrame::SetCalibration { .. } => SET_CALIBRATION,
            RequestFrame::Ping { .. } => PING,
            RequestFrame::HubVersion { .. } => HUB_VERSION,
        }
    }

    /// Number of unit addresses carried by the frame
    pub fn address_count(&self) -> usize {
        match self {
            RequestFrame::General { addresses, .. }
            | RequestFrame::Direct { addresses, .. }
            | RequestFrame::GetCalibration { addresses, .. } => addresses.len(),
            RequestFrame::SetCalibration { .. } => 1,
            RequestFrame::Ping { .. } | RequestFrame::HubVersion { .. } => 0,
        }
    }

    /// Exact encoded length in bytes
    pub fn encoded_len(&self) -> usize {
        let body = match self {
            RequestFrame::General { addresses, .. } | RequestFrame::GetCalibration { addresses, .. } => {
                4 + 2 * addresses.len()
            }
            RequestFrame::Direct { addresses, .. } => 2 + 2 * addresses.len(),
            RequestFrame::SetCalibration { size, .. } => 5 + *size as usize,
            RequestFrame::Ping { .. } | RequestFrame::HubVersion { .. } => 2,
        };
        MAGIC.len() + 1 + body
    }

    /// Encode the frame to bytes
    pub fn encode(&self) -> MidResult<Bytes> {
        self.validate()?;

        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_slice(MAGIC);
        buf.put_u8(self.outer_code());

        match self {
            RequestFrame::General {
                command,
                port,
                addresses,
            } => {
                buf.put_u8(command.code());
                buf.put_u8(command.payload_size());
                buf.put_u8(*port);
                put_addresses(&mut buf, addresses);
            }
            RequestFrame::Direct { port, addresses, .. } => {
                buf.put_u8(*port);
                put_addresses(&mut buf, addresses);
            }
            RequestFrame::GetCalibration {
                command,
                size,
                port,
                addresses,
            } => {
                buf.put_u8(command.code());
                buf.put_u8(*size);
                buf.put_u8(*port);
                put_addresses(&mut buf, addresses);
            }
            RequestFrame::SetCalibration {
                command,
                size,
                port,
                address,
                value,
            } => {
                buf.put_u8(command.code());
                buf.put_u8(*size);
                buf.put_u8(*port);
                buf.put_u16_le(*address);
                buf.put_int_le(*value, *size as usize);
            }
            RequestFrame::Ping { nonce } | RequestFrame::HubVersion { nonce } => {
                buf.put_u16_le(*nonce);
            }
        }

        Ok(buf.freeze())
    }

    /// Decode a frame previously produced by [`RequestFrame::encode`]
    pub fn decode(data: &[u8]) -> MidResult<Self> {
        if data.len() < MAGIC.len() + 1 || &data[..MAGIC.len()] != MAGIC {
            return Err(MidError::InvalidData(
                "Frame does not start with the DERV marker".to_string(),
            ));
        }

        let outer = data[MAGIC.len()];
        let body = &data[MAGIC.len() + 1..];

        let frame = match outer {
            GENERAL_COMMAND => {
                let (command, size, port, addresses) = decode_wrapped(body)?;
                if size != command.payload_size() {
                    return Err(MidError::InvalidData(format!(
                        "Payload size {} does not match command {}",
                        size, command
                    )));
                }
                RequestFrame::General {
                    command,
                    port,
                    addresses,
                }
            }
            GET_CALIBRATION => {
                let (command, size, port, addresses) = decode_wrapped(body)?;
                RequestFrame::GetCalibration {
                    command,
                    size,
                    port,
                    addresses,
                }
            }
            SET_CALIBRATION => {
                need(body, 5)?;
                let command = unit_command(body[0])?;
                let size = body[1];
                check_calibration_size(size)?;
                need(body, 5 + size as usize)?;
                let address = u16::from_le_bytes([body[3], body[4]]);
                let value = sign_extend(&body[5..5 + size as usize]);
                RequestFrame::SetCalibration {
                    command,
                    size,
                    port: body[2],
                    address,
                    value,
                }
            }
            PING | HUB_VERSION => {
                need(body, 2)?;
                let nonce = u16::from_le_bytes([body[0], body[1]]);
                if outer == PING {
                    RequestFrame::Ping { nonce }
                } else {
                    RequestFrame::HubVersion { nonce }
                }
            }
            code => {
                let command = unit_command(code)?;
                if !command.has_direct_frame() {
                    return Err(MidError::InvalidData(format!(
                        "Command {} has no direct frame",
                        command
                    )));
                }
                need(body, 2)?;
                let port = body[0];
                let addresses = decode_addresses(&body[2..], body[1] as usize)?;
                RequestFrame::Direct {
                    command,
                    port,
                    addresses,
                }
            }
        };

        Ok(frame)
    }

    fn validate(&self) -> MidResult<()> {
        match self {
            RequestFrame::General {
                command,
                port,
                addresses,
            }
            | RequestFrame::GetCalibration {
                command,
                port,
                addresses,
                ..
            } => {
                command.validate()?;
                check_port(*port)?;
                check_addresses(addresses)?;
            }
            RequestFrame::Direct {
                command,
                port,
                addresses,
            } => {
                if !command.has_direct_frame() {
                    return Err(MidError::Encoding(format!(
                        "Command {} has no direct frame",
                        command
                    )));
                }
                check_port(*port)?;
                check_addresses(addresses)?;
            }
            RequestFrame::SetCalibration {
                command,
                size,
                port,
                value,
                ..
            } => {
                command.validate()?;
                check_port(*port)?;
                check_calibration_size(*size)?;
                let bits = *size as u32 * 8;
                if bits < 64 {
                    let limit = 1i64 << (bits - 1);
                    if *value < -limit || *value >= limit {
                        return Err(MidError::Encoding(format!(
                            "Calibration value {} does not fit in {} bytes",
                            value, size
                        )));
                    }
                }
            }
            RequestFrame::Ping { .. } | RequestFrame::HubVersion { .. } => {}
        }

        if let RequestFrame::GetCalibration { size, .. } = self {
            check_calibration_size(*size)?;
        }
        Ok(())
    }
}

fn put_addresses(buf: &mut BytesMut, addresses: &[u16]) {
    buf.put_u8(addresses.len() as u8);
    for address in addresses {
        buf.put_u16_le(*address);
    }
}

fn check_port(port: u8) -> MidResult<()> {
    if port == 0 || port > PORT_COUNT {
        return Err(MidError::Encoding(format!(
            "Port {} out of range 1..={}",
            port, PORT_COUNT
        )));
    }
    Ok(())
}

fn check_addresses(addresses: &[u16]) -> MidResult<()> {
    if addresses.is_empty() {
        return Err(MidError::Encoding("Command has no unit addresses".to_string()));
    }
    if addresses.len() > MAX_ADDRESSES {
        return Err(MidError::Encoding(format!(
            "Too many unit addresses: {} (max {})",
            addresses.len(),
            MAX_ADDRESSES
        )));
    }
    Ok(())
}

fn check_calibration_size(size: u8) -> MidResult<()> {
    match size {
        2 | 4 | 8 => Ok(()),
        _ => Err(MidError::Encoding(format!(
            "Calibration size must be 2, 4 or 8 bytes, got {}",
            size
        ))),
    }
}

fn need(body: &[u8], len: usize) -> MidResult<()> {
    if body.len() < len {
        return Err(MidError::InvalidData(format!(
            "Frame too short: need {} bytes, have {}",
            len,
            body.len()
        )));
    }
    Ok(())
}

fn unit_command(code: u8) -> MidResult<UnitCommand> {
    UnitCommand::from_code(code)
        .ok_or_else(|| MidError::InvalidData(format!("Unknown unit command code {}", code)))
}

fn decode_wrapped(body: &[u8]) -> MidResult<(UnitCommand, u8, u8, Vec<u16>)> {
    need(body, 4)?;
    let command = unit_command(body[0])?;
    let addresses = decode_addresses(&body[4..], body[3] as usize)?;
    Ok((command, body[1], body[2], addresses))
}

fn decode_addresses(data: &[u8], count: usize) -> MidResult<Vec<u16>> {
    need(data, count * 2)?;
    Ok(data[..count * 2]
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Interpret little-endian bytes as a two's complement integer
pub(crate) fn sign_extend(bytes: &[u8]) -> i64 {
    let mut raw = [0u8; 8];
    raw[..bytes.len()].copy_from_slice(bytes);
    let value = i64::from_le_bytes(raw);
    let shift = 64 - 8 * bytes.len() as u32;
    if shift == 0 {
        value
    } else {
        (value << shift) >> shift
    }
}

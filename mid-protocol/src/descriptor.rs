//! Command descriptors: one unit command for a set of addresses on one port

use crate::error::{MidError, MidResult};
use crate::frame::{RequestFrame, UnitCommand, MAX_ADDRESSES, PORT_COUNT};
use bytes::Bytes;
use mid_core::SensorId;
use std::fmt;

/// Conversion settings for one sensor channel of a unit
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelConfig {
    /// `None` when the channel is not wired to a sensor; no reading is emitted
    pub sensor_id: Option<SensorId>,
    /// Conversion formula over `x` (raw) and `t` (secondary value); `None`
    /// selects the built-in conversion of the command, or the raw value
    pub formula: Option<String>,
    pub bias: f64,
    /// Report a moving average instead of the instantaneous value
    pub smooth: bool,
}

impl ChannelConfig {
    pub fn new(sensor_id: SensorId) -> Self {
        Self {
            sensor_id: Some(sensor_id),
            ..Self::default()
        }
    }

    /// A channel that is present on the unit but not reported
    pub fn unassigned() -> Self {
        Self::default()
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        let formula = formula.into();
        self.formula = if formula.trim().is_empty() {
            None
        } else {
            Some(formula)
        };
        self
    }

    pub fn with_bias(mut self, bias: f64) -> Self {
        self.bias = bias;
        self
    }

    pub fn smoothed(mut self) -> Self {
        self.smooth = true;
        self
    }
}

/// One field unit addressed by a command
#[derive(Debug, Clone, PartialEq)]
pub struct UnitConfig {
    pub address: u16,
    pub channels: Vec<ChannelConfig>,
}

impl UnitConfig {
    pub fn new(address: u16) -> Self {
        Self {
            address,
            channels: Vec::new(),
        }
    }

    pub fn channel(mut self, channel: ChannelConfig) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn with_channels(address: u16, channels: Vec<ChannelConfig>) -> Self {
        Self { address, channels }
    }
}

/// A single hub command with everything needed to interpret its reply
#[derive(Debug, Clone, PartialEq)]
pub struct CommandDescriptor {
    pub command: UnitCommand,
    pub port: u8,
    pub units: Vec<UnitConfig>,
}

impl CommandDescriptor {
    pub fn new(command: UnitCommand, port: u8, units: Vec<UnitConfig>) -> Self {
        Self {
            command,
            port,
            units,
        }
    }

    /// Descriptor for commands without sensor channels (reset, address, version)
    pub fn bare(command: UnitCommand, port: u8, addresses: &[u16]) -> Self {
        Self::new(
            command,
            port,
            addresses.iter().map(|&a| UnitConfig::new(a)).collect(),
        )
    }

    pub fn addresses(&self) -> Vec<u16> {
        self.units.iter().map(|u| u.address).collect()
    }

    pub fn address_count(&self) -> usize {
        self.units.len()
    }

    pub fn command_code(&self) -> u8 {
        self.command.code()
    }

    pub fn payload_size(&self) -> usize {
        self.command.payload_size() as usize
    }

    /// Every configured sensor id, unit by unit
    pub fn sensor_ids(&self) -> Vec<SensorId> {
        self.units
            .iter()
            .flat_map(|u| u.channels.iter().filter_map(|c| c.sensor_id))
            .collect()
    }

    /// Check the descriptor can be sent as is
    pub fn validate(&self) -> MidResult<()> {
        self.command.validate()?;
        if self.port == 0 || self.port > PORT_COUNT {
            return Err(MidError::Encoding(format!(
                "Port {} out of range 1..={}",
                self.port, PORT_COUNT
            )));
        }
        if self.units.is_empty() || self.units.len() > MAX_ADDRESSES {
            return Err(MidError::Encoding(format!(
                "Address count {} out of range 1..={}",
                self.units.len(),
                MAX_ADDRESSES
            )));
        }
        let channels = self.command.channel_count();
        if let Some(unit) = self.units.iter().find(|u| u.channels.len() != channels) {
            return Err(MidError::Encoding(format!(
                "Unit {} has {} channel(s), {} expects {}",
                unit.address,
                unit.channels.len(),
                self.command,
                channels
            )));
        }
        Ok(())
    }

    /// Build the general wrapper frame for this command
    pub fn frame(&self) -> RequestFrame {
        RequestFrame::general(self.command, self.port, self.addresses())
    }

    /// Validate and encode the request frame
    pub fn encode(&self) -> MidResult<Bytes> {
        self.validate()?;
        self.frame().encode()
    }
}

impl fmt::Display for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on port {} addresses {:?}",
            self.command,
            self.port,
            self.addresses()
        )
    }
}

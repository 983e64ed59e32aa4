//! Multi-point temperature cables
//!
//! A cable hangs off one hub unit (port, address) on one of its channels and
//! carries up to [`MAX_POINTS`] probes, each with its own 64-bit bus address.
//! Reading it takes a fixed sequence of hub commands:
//!
//! ```text
//! InitReset -> Enumerate(0..6) -> PostAddressReset -> ReadTemperature(0..6) -> PostReadReset -> Done
//! ```
//!
//! Slot `i` of the temperature reads belongs to the probe enumerated at slot
//! `i`. Resets may fail spuriously on real cables and are only logged. A
//! failed enumerate or read leaves its slot empty and the sequence goes on,
//! so every run ends with the post-read reset.

use crate::error::{MidError, MidResult};
use chrono::{DateTime, Utc};
use mid_core::{ErrorCode, ErrorResponse, Reading, ReadingType, SensorId};
use mid_protocol::codec::ds18b20_fahrenheit;
use mid_protocol::{CommandDescriptor, CommandOutcome, UnitCommand, EMPTY_SLOT};
use mid_session::CommandExchange;

/// Probes per cable
pub const MAX_POINTS: u8 = 6;

/// Hottest plausible probe reading in °F; above it the probe never measured
pub const MAX_VALID_FAHRENHEIT: f64 = 180.0;

/// Step of the multi-point command sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiPointPhase {
    InitReset,
    /// Reading the bus address of slot n
    Enumerate(u8),
    PostAddressReset,
    /// Reading the temperature of slot n
    ReadTemperature(u8),
    PostReadReset,
    Done,
}

impl MultiPointPhase {
    /// Phase that follows this one
    pub fn next(&self) -> MultiPointPhase {
        match *self {
            MultiPointPhase::InitReset => MultiPointPhase::Enumerate(0),
            MultiPointPhase::Enumerate(n) if n + 1 < MAX_POINTS => MultiPointPhase::Enumerate(n + 1),
            MultiPointPhase::Enumerate(_) => MultiPointPhase::PostAddressReset,
            MultiPointPhase::PostAddressReset => MultiPointPhase::ReadTemperature(0),
            MultiPointPhase::ReadTemperature(n) if n + 1 < MAX_POINTS => {
                MultiPointPhase::ReadTemperature(n + 1)
            }
            MultiPointPhase::ReadTemperature(_) => MultiPointPhase::PostReadReset,
            MultiPointPhase::PostReadReset | MultiPointPhase::Done => MultiPointPhase::Done,
        }
    }

    pub fn is_reset(&self) -> bool {
        matches!(
            self,
            MultiPointPhase::InitReset
                | MultiPointPhase::PostAddressReset
                | MultiPointPhase::PostReadReset
        )
    }

    /// Validate a phase transition
    ///
    /// Phases only move forward one step at a time; any phase may jump to
    /// `Done` when the sequence is abandoned.
    pub fn validate_transition(&self, new_phase: MultiPointPhase) -> MidResult<()> {
        if new_phase == self.next() || new_phase == MultiPointPhase::Done {
            Ok(())
        } else {
            Err(MidError::InvalidData(format!(
                "Invalid multi-point transition: {} -> {}",
                self.as_str(),
                new_phase.as_str()
            )))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MultiPointPhase::InitReset => "InitReset",
            MultiPointPhase::Enumerate(_) => "Enumerate",
            MultiPointPhase::PostAddressReset => "PostAddressReset",
            MultiPointPhase::ReadTemperature(_) => "ReadTemperature",
            MultiPointPhase::PostReadReset => "PostReadReset",
            MultiPointPhase::Done => "Done",
        }
    }
}

impl Default for MultiPointPhase {
    fn default() -> Self {
        MultiPointPhase::InitReset
    }
}

/// Kind of the first enumerate or read failure of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotFailure {
    Transport,
    Reply,
}

/// How enumerated probes map to sensor ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultiPointAddressing {
    /// Each sensor id lists the bus addresses it may answer from
    Explicit(Vec<(SensorId, Vec<u64>)>),
    /// No bus addresses configured: every populated slot is reported under
    /// this one sensor id
    Unassigned(SensorId),
}

/// One cable and the state of its command sequence
#[derive(Debug, Clone)]
pub struct MultiPointSession {
    port: u8,
    address: u16,
    channel: u8,
    addressing: MultiPointAddressing,
    phase: MultiPointPhase,
    bus_addresses: Vec<Option<u64>>,
    temperatures: Vec<Option<f64>>,
    slot_failure: Option<SlotFailure>,
}

impl MultiPointSession {
    pub fn new(port: u8, address: u16, channel: u8, addressing: MultiPointAddressing) -> Self {
        Self {
            port,
            address,
            channel,
            addressing,
            phase: MultiPointPhase::InitReset,
            bus_addresses: vec![None; MAX_POINTS as usize],
            temperatures: vec![None; MAX_POINTS as usize],
            slot_failure: None,
        }
    }

    pub fn port(&self) -> u8 {
        self.port
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn addressing(&self) -> &MultiPointAddressing {
        &self.addressing
    }

    pub fn phase(&self) -> MultiPointPhase {
        self.phase
    }

    /// Every sensor id reported by this cable
    pub fn sensor_ids(&self) -> Vec<SensorId> {
        match &self.addressing {
            MultiPointAddressing::Explicit(sensors) => sensors.iter().map(|(id, _)| *id).collect(),
            MultiPointAddressing::Unassigned(id) => vec![*id],
        }
    }

    /// Hub commands issued by one full sequence
    pub fn command_count(&self) -> usize {
        3 + 2 * MAX_POINTS as usize
    }

    /// Forget the results of the previous cycle
    pub fn reset(&mut self) {
        self.phase = MultiPointPhase::InitReset;
        self.bus_addresses.iter_mut().for_each(|slot| *slot = None);
        self.temperatures.iter_mut().for_each(|slot| *slot = None);
        self.slot_failure = None;
    }

    /// Whether an enumerate or read command failed in the last run
    pub fn has_failed_slots(&self) -> bool {
        self.slot_failure.is_some()
    }

    /// Command sent in a given phase; `None` once done
    pub fn descriptor(&self, phase: MultiPointPhase) -> Option<CommandDescriptor> {
        let command = match phase {
            MultiPointPhase::InitReset
            | MultiPointPhase::PostAddressReset
            | MultiPointPhase::PostReadReset => UnitCommand::MultiPointReset,
            MultiPointPhase::Enumerate(_) => UnitCommand::MultiPointAddress(self.channel),
            MultiPointPhase::ReadTemperature(_) => UnitCommand::MultiPointRead(self.channel),
            MultiPointPhase::Done => return None,
        };
        Some(CommandDescriptor::bare(command, self.port, &[self.address]))
    }

    /// Run the whole command sequence
    ///
    /// Hub-reported faults are added to `errors`. A failed enumerate or read
    /// leaves its slot empty; once the sequence is done, sensors left without
    /// a probe because of such a failure get timeout or parse error records.
    pub async fn run<E>(&mut self, link: &mut E, at: DateTime<Utc>, errors: &mut ErrorResponse)
    where
        E: CommandExchange + ?Sized,
    {
        self.reset();
        while let Some(descriptor) = self.descriptor(self.phase) {
            let result = link.exchange(&descriptor, at).await;
            let recorded = result.and_then(|outcome| {
                errors.extend(outcome.errors.clone());
                self.record(&descriptor, &outcome)
            });

            if let Err(e) = recorded {
                if self.phase.is_reset() {
                    log::info!("Ignoring failed reset of {}: {}", descriptor, e);
                } else {
                    log::warn!(
                        "Multi-point {} failed for {}: {}",
                        self.phase.as_str(),
                        descriptor,
                        e
                    );
                    let kind = if e.is_transport() {
                        SlotFailure::Transport
                    } else {
                        SlotFailure::Reply
                    };
                    self.slot_failure.get_or_insert(kind);
                }
            }

            if let Err(e) = self.advance(self.phase.next()) {
                log::error!("{}", e);
                self.phase = MultiPointPhase::Done;
            }
        }

        match self.slot_failure {
            Some(SlotFailure::Transport) => errors.add_timeout_errors(self.unmatched_sensor_ids()),
            Some(SlotFailure::Reply) => errors.add_parse_errors(self.unmatched_sensor_ids()),
            None => {}
        }
    }

    fn advance(&mut self, next: MultiPointPhase) -> MidResult<()> {
        self.phase.validate_transition(next)?;
        self.phase = next;
        Ok(())
    }

    fn record(&mut self, descriptor: &CommandDescriptor, outcome: &CommandOutcome) -> MidResult<()> {
        let (slot, value) = match self.phase {
            MultiPointPhase::Enumerate(slot) | MultiPointPhase::ReadTemperature(slot) => {
                (slot as usize, unit_value(descriptor, outcome)?)
            }
            _ => {
                if outcome.has_readings_packet() {
                    return Ok(());
                }
                return Err(no_unit_data(descriptor, outcome));
            }
        };

        if let MultiPointPhase::Enumerate(_) = self.phase {
            log::debug!("Slot {} of {} holds {:016X}", slot, descriptor, value);
            self.bus_addresses[slot] = Some(value);
        } else {
            self.temperatures[slot] = Some(ds18b20_fahrenheit(value as u16));
        }
        Ok(())
    }

    /// Pair enumerated probes with configured sensor ids
    pub fn compose(&self, at: DateTime<Utc>) -> Vec<Reading> {
        let populated = self.populated();

        let mut readings = Vec::new();
        match &self.addressing {
            MultiPointAddressing::Explicit(sensors) => {
                for (sensor_id, allowed) in sensors {
                    let mut found = false;
                    for bus_address in allowed {
                        let matches: Vec<f64> = populated
                            .iter()
                            .filter(|(address, _)| address == bus_address)
                            .map(|(_, temperature)| *temperature)
                            .collect();
                        if matches.is_empty() {
                            log::warn!(
                                "No probe {:016X} for sensor {} on port {} unit {} ch{}",
                                bus_address,
                                sensor_id,
                                self.port,
                                self.address,
                                self.channel
                            );
                        }
                        for temperature in matches {
                            found = true;
                            readings.push(self.reading(*sensor_id, temperature, at));
                        }
                    }
                    if !found {
                        readings.push(Reading::failed(
                            *sensor_id,
                            ReadingType::MultiPoint,
                            None,
                            ErrorCode::MISSING,
                            at,
                        ));
                    }
                }
            }
            MultiPointAddressing::Unassigned(sensor_id) => {
                log::info!(
                    "No probe addresses configured on port {} unit {} ch{}, reporting every probe as sensor {}",
                    self.port,
                    self.address,
                    self.channel,
                    sensor_id
                );
                for (_, temperature) in &populated {
                    readings.push(self.reading(*sensor_id, *temperature, at));
                }
            }
        }
        readings
    }

    /// Probes that answered both their enumerate and their read
    fn populated(&self) -> Vec<(u64, f64)> {
        self.bus_addresses
            .iter()
            .zip(&self.temperatures)
            .filter_map(|(address, temperature)| match (address, temperature) {
                (Some(address), Some(temperature)) if *address != EMPTY_SLOT => {
                    Some((*address, *temperature))
                }
                _ => None,
            })
            .collect()
    }

    /// Sensor ids no answering probe maps to
    fn unmatched_sensor_ids(&self) -> Vec<SensorId> {
        let populated = self.populated();
        match &self.addressing {
            MultiPointAddressing::Explicit(sensors) => sensors
                .iter()
                .filter(|(_, allowed)| {
                    !populated.iter().any(|(address, _)| allowed.contains(address))
                })
                .map(|(id, _)| *id)
                .collect(),
            MultiPointAddressing::Unassigned(id) if populated.is_empty() => vec![*id],
            MultiPointAddressing::Unassigned(_) => Vec::new(),
        }
    }

    fn reading(&self, sensor_id: SensorId, temperature: f64, at: DateTime<Utc>) -> Reading {
        let reading = Reading::new(sensor_id, ReadingType::MultiPoint, temperature, temperature, at);
        if temperature > MAX_VALID_FAHRENHEIT {
            log::warn!("Default multi-point value returned for sensor {}", sensor_id);
            reading.with_error(ErrorCode::DEFAULT_VALUE)
        } else {
            reading
        }
    }
}

fn unit_value(descriptor: &CommandDescriptor, outcome: &CommandOutcome) -> MidResult<u64> {
    // the hub zeroes the payload of a unit it reports a fault for
    if !outcome.faults.is_empty() {
        return Err(no_unit_data(descriptor, outcome));
    }
    outcome
        .units
        .first()
        .and_then(|unit| unit.field(0))
        .ok_or_else(|| no_unit_data(descriptor, outcome))
}

fn no_unit_data(descriptor: &CommandDescriptor, outcome: &CommandOutcome) -> MidError {
    match outcome.faults.first() {
        Some((code, _)) => MidError::InvalidData(format!("hub reported {} for {}", code, descriptor)),
        None => MidError::ReplyParse(format!("no unit data in reply to {}", descriptor)),
    }
}

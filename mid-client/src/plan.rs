//! Turning configuration records into the commands of a reading cycle
//!
//! Sensors of one type on one port share a command, at most
//! [`MAX_ADDRESSES`] units per command. Steps run in a fixed order:
//! temperature/humidity, wide pressure sampling, narrow pressure,
//! thermocouples, tachometers, wind, then multi-point cables.

use crate::config::{HubConfig, SensorRecord};
use crate::multipoint::{MultiPointAddressing, MultiPointSession};
use crate::pressure::PressureAverage;
use mid_core::SensorId;
use mid_protocol::{CommandDescriptor, UnitCommand, UnitConfig, MAX_ADDRESSES, PORT_COUNT};
use std::collections::BTreeMap;
use std::fmt;

/// One step of a reading cycle
#[derive(Debug, Clone)]
pub enum PlanStep {
    /// A single hub command whose readings are reported as they come
    Command(CommandDescriptor),
    /// Wide pressure sampling, reported as per-sensor averages
    PressureAverage(PressureAverage),
    /// The command sequence of one multi-point cable
    MultiPoint(MultiPointSession),
}

impl PlanStep {
    /// Hub commands this step issues (the averaging step counts as one)
    pub fn command_count(&self) -> usize {
        match self {
            PlanStep::Command(_) => 1,
            PlanStep::PressureAverage(average) => average.command_count(),
            PlanStep::MultiPoint(session) => session.command_count(),
        }
    }

    pub fn sensor_ids(&self) -> Vec<SensorId> {
        match self {
            PlanStep::Command(descriptor) => descriptor.sensor_ids(),
            PlanStep::PressureAverage(average) => average.sensor_ids(),
            PlanStep::MultiPoint(session) => session.sensor_ids(),
        }
    }
}

impl fmt::Display for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanStep::Command(descriptor) => write!(f, "{}", descriptor),
            PlanStep::PressureAverage(average) => write!(
                f,
                "pressure average over {} port command(s)",
                average.port_commands().len()
            ),
            PlanStep::MultiPoint(session) => write!(
                f,
                "multi-point cable on port {} unit {} ch{}",
                session.port(),
                session.address(),
                session.channel()
            ),
        }
    }
}

/// Every step of one reading cycle, in issue order
#[derive(Debug, Clone, Default)]
pub struct CyclePlan {
    steps: Vec<PlanStep>,
}

impl CyclePlan {
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self { steps }
    }

    /// Build the plan for a configuration
    ///
    /// Records that cannot be placed (port out of range, undecodable
    /// multi-point info) are logged and left out.
    pub fn from_config(config: &HubConfig) -> Self {
        let records = &config.command_info;
        for record in records {
            if let Some(port) = record.port() {
                if port == 0 || port > PORT_COUNT {
                    log::warn!("Ignoring sensor on port {}: {:?}", port, record);
                }
            }
        }

        let mut steps = Vec::new();
        steps.extend(
            grouped(records, UnitCommand::TempHum)
                .into_iter()
                .map(PlanStep::Command),
        );

        let wide = grouped(records, UnitCommand::PressureWide);
        if !wide.is_empty() {
            steps.push(PlanStep::PressureAverage(PressureAverage::new(wide)));
        }

        for command in [
            UnitCommand::PressureNarrow,
            UnitCommand::Thermocouple,
            UnitCommand::Tach,
            UnitCommand::Wind,
        ] {
            steps.extend(grouped(records, command).into_iter().map(PlanStep::Command));
        }

        steps.extend(multi_point_cables(records).into_iter().map(PlanStep::MultiPoint));

        let plan = Self::new(steps);
        log::info!(
            "Planned {} step(s), {} hub command(s) per cycle",
            plan.len(),
            plan.command_count()
        );
        plan
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn steps_mut(&mut self) -> &mut [PlanStep] {
        &mut self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn command_count(&self) -> usize {
        self.steps.iter().map(PlanStep::command_count).sum()
    }
}

/// Commands for one sensor type, port by port, split every 32 units
fn grouped(records: &[SensorRecord], command: UnitCommand) -> Vec<CommandDescriptor> {
    let selected: Vec<(u8, UnitConfig)> = records
        .iter()
        .filter_map(SensorRecord::unit)
        .filter(|(c, _, _)| *c == command)
        .map(|(_, port, unit)| (port, unit))
        .collect();
    let mut descriptors = Vec::new();
    for port in 1..=PORT_COUNT {
        let units: Vec<UnitConfig> = selected
            .iter()
            .filter(|(p, _)| *p == port)
            .map(|(_, unit)| unit.clone())
            .collect();
        for chunk in units.chunks(MAX_ADDRESSES) {
            descriptors.push(CommandDescriptor::new(command, port, chunk.to_vec()));
        }
    }
    descriptors
}

/// One orchestrated session per distinct (port, unit address, channel)
fn multi_point_cables(records: &[SensorRecord]) -> Vec<MultiPointSession> {
    let mut cables: BTreeMap<(u8, u16, u8), Vec<(SensorId, Vec<u64>)>> = BTreeMap::new();

    for record in records {
        let SensorRecord::MultiPoint(mp) = record else {
            continue;
        };
        let extra = match mp.extra() {
            Ok(Some(extra)) => extra,
            Ok(None) => {
                log::warn!("Multi-point sensor {} has no sensor_extra_info", mp.sensor_id);
                continue;
            }
            Err(e) => {
                log::warn!("Skipping multi-point sensor {}: {}", mp.sensor_id, e);
                continue;
            }
        };
        if let Err(e) = UnitCommand::MultiPointRead(extra.channel).validate() {
            log::warn!("Skipping multi-point sensor {}: {}", mp.sensor_id, e);
            continue;
        }
        if mp.port == 0 || mp.port > PORT_COUNT {
            continue;
        }
        cables
            .entry((mp.port, mp.address, extra.channel))
            .or_default()
            .push((mp.sensor_id, extra.bus_addresses));
    }

    cables
        .into_iter()
        .map(|((port, address, channel), sensors)| {
            let addressing = if sensors.iter().any(|(_, addrs)| addrs.is_empty()) {
                let first = sensors[0].0;
                if sensors.len() > 1 {
                    log::warn!(
                        "Probe addresses missing on port {} unit {} ch{}; reporting the whole cable as sensor {}",
                        port,
                        address,
                        channel,
                        first
                    );
                }
                MultiPointAddressing::Unassigned(first)
            } else {
                MultiPointAddressing::Explicit(sensors)
            };
            MultiPointSession::new(port, address, channel, addressing)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(json: &str) -> HubConfig {
        HubConfig::from_json(json).unwrap()
    }

    fn temp_rh(index: u32, port: u8) -> String {
        format!(
            r#"{{"type": "temp_rh", "temp_id": {}, "rh_id": {}, "port": {}, "addy": {}}}"#,
            index * 2,
            index * 2 + 1,
            port,
            1000 + index
        )
    }

    #[test]
    fn test_temp_hum_split_at_32() {
        let records: Vec<String> = (0..40).map(|i| temp_rh(i, 2)).collect();
        let plan = CyclePlan::from_config(&config(&format!(
            r#"{{"commandInfo": [{}]}}"#,
            records.join(",")
        )));
        assert_eq!(plan.len(), 2);
        let PlanStep::Command(first) = &plan.steps()[0] else {
            panic!("expected a command");
        };
        assert_eq!(first.address_count(), 32);
        assert_eq!(first.port, 2);
        assert!(first.validate().is_ok());
        let PlanStep::Command(second) = &plan.steps()[1] else {
            panic!("expected a command");
        };
        assert_eq!(second.address_count(), 8);
    }

    #[test]
    fn test_step_order_and_pressure_average() {
        let plan = CyclePlan::from_config(&config(
            r#"{"commandInfo": [
                {"type": "wind", "sensor_id": 1, "port": 1, "addy": 1},
                {"type": "pressure", "sensor_id": 2, "port": 1, "addy": 2, "convert": "x/1000"},
                {"type": "pressure", "sensor_id": 3, "port": 1, "addy": 3},
                {"type": "pressure", "sensor_id": 4, "port": 4, "addy": 4},
                {"type": "pressure", "sensor_id": 5, "port": 4, "addy": 5},
                {"type": "temp_rh", "temp_id": 6, "rh_id": 7, "port": 3, "addy": 6},
                {"type": "tach", "sensor_id": 8, "port": 7, "addy": 7}
            ]}"#,
        ));

        assert_eq!(plan.len(), 3);
        assert!(matches!(&plan.steps()[0], PlanStep::Command(d) if d.command == UnitCommand::TempHum));
        let PlanStep::PressureAverage(average) = &plan.steps()[1] else {
            panic!("expected the pressure average");
        };
        assert_eq!(average.port_commands().len(), 2);
        assert_eq!(average.command_count(), 21);
        assert_eq!(average.sensor_ids(), vec![2, 3, 4, 5]);
        assert!(matches!(&plan.steps()[2], PlanStep::Command(d) if d.command == UnitCommand::Wind));
        // 1 temp/hum + 21 pressure + 1 wind; the port 7 tach is dropped
        assert_eq!(plan.command_count(), 23);
    }

    #[test]
    fn test_multi_point_cables() {
        let plan = CyclePlan::from_config(&config(
            r#"{"commandInfo": [
                {"type": "MP_T", "sensor_id": 1, "port": 2, "addy": 9,
                 "sensor_extra_info": "{\"ch\": 1, \"addrs\": [\"A1\"]}"},
                {"type": "MP_T", "sensor_id": 2, "port": 2, "addy": 9,
                 "sensor_extra_info": "{\"ch\": 1, \"addrs\": [\"B2\", \"C3\"]}"},
                {"type": "MP_T", "sensor_id": 3, "port": 2, "addy": 9,
                 "sensor_extra_info": "{\"ch\": 2, \"addrs\": []}"},
                {"type": "MP_T", "sensor_id": 4, "port": 2, "addy": 9,
                 "sensor_extra_info": "{\"ch\": 2, \"addrs\": [\"D4\"]}"},
                {"type": "MP_T", "sensor_id": 5, "port": 2, "addy": 9, "sensor_extra_info": ""},
                {"type": "MP_T", "sensor_id": 6, "port": 2, "addy": 9,
                 "sensor_extra_info": "{\"ch\": 7, \"addrs\": []}"}
            ]}"#,
        ));

        assert_eq!(plan.len(), 2);
        let PlanStep::MultiPoint(first) = &plan.steps()[0] else {
            panic!("expected a multi-point cable");
        };
        assert_eq!(first.channel(), 1);
        assert_eq!(
            first.addressing(),
            &MultiPointAddressing::Explicit(vec![(1, vec![0xA1]), (2, vec![0xB2, 0xC3])])
        );
        let PlanStep::MultiPoint(second) = &plan.steps()[1] else {
            panic!("expected a multi-point cable");
        };
        assert_eq!(second.addressing(), &MultiPointAddressing::Unassigned(3));
        assert_eq!(plan.steps()[1].sensor_ids(), vec![3]);
    }
}

//! Averaged wide-range pressure readings
//!
//! Wide pressure units are sampled [`PRESSURE_SAMPLES_PER_READING`] times per
//! cycle. The sample commands only feed the average; the readings reported
//! upstream are the per-sensor means tagged `pressure_wide_super`.

use chrono::{DateTime, Utc};
use mid_core::{ErrorResponse, Reading, ReadingType, SensorId};
use mid_protocol::{CommandDescriptor, CommandOutcome};
use mid_session::{failure_records, CommandExchange};
use std::collections::BTreeMap;

/// Sample commands issued per port for one averaged reading
pub const PRESSURE_SAMPLES_PER_READING: usize = 10;

#[derive(Debug, Clone, Default, PartialEq)]
struct Samples {
    values: Vec<f64>,
    raws: Vec<f64>,
}

/// The wide pressure sampling step of a cycle
#[derive(Debug, Clone)]
pub struct PressureAverage {
    /// One wide pressure command per port
    per_port: Vec<CommandDescriptor>,
    samples_per_reading: usize,
    samples: BTreeMap<SensorId, Samples>,
}

impl PressureAverage {
    pub fn new(per_port: Vec<CommandDescriptor>) -> Self {
        Self {
            per_port,
            samples_per_reading: PRESSURE_SAMPLES_PER_READING,
            samples: BTreeMap::new(),
        }
    }

    pub fn with_samples_per_reading(mut self, samples: usize) -> Self {
        self.samples_per_reading = samples.max(1);
        self
    }

    pub fn port_commands(&self) -> &[CommandDescriptor] {
        &self.per_port
    }

    /// Sample commands in issue order: every port once, then again
    pub fn sample_commands(&self) -> Vec<CommandDescriptor> {
        (0..self.samples_per_reading)
            .flat_map(|_| self.per_port.iter().cloned())
            .collect()
    }

    /// Sample commands plus the averaging step itself
    pub fn command_count(&self) -> usize {
        self.samples_per_reading * self.per_port.len() + 1
    }

    pub fn sensor_ids(&self) -> Vec<SensorId> {
        self.per_port.iter().flat_map(|d| d.sensor_ids()).collect()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    /// Keep the valid readings of one sample command
    pub fn record(&mut self, outcome: &CommandOutcome) {
        for reading in outcome.readings.iter().filter(|r| r.is_valid()) {
            let (Some(value), Some(raw)) = (reading.value, reading.raw) else {
                continue;
            };
            let samples = self.samples.entry(reading.sensor_id).or_default();
            samples.values.push(value);
            samples.raws.push(raw);
        }
    }

    /// Number of valid samples collected for a sensor
    pub fn sample_count(&self, sensor_id: SensorId) -> usize {
        self.samples.get(&sensor_id).map_or(0, |s| s.values.len())
    }

    /// Issue every sample command and collect the results
    ///
    /// A failed sample is recorded in `errors` and sampling goes on.
    pub async fn run<E>(&mut self, link: &mut E, at: DateTime<Utc>, errors: &mut ErrorResponse)
    where
        E: CommandExchange + ?Sized,
    {
        self.reset();
        for (index, descriptor) in self.sample_commands().iter().enumerate() {
            log::debug!("Pressure sample {}: {}", index, descriptor);
            match link.exchange(descriptor, at).await {
                Ok(outcome) => {
                    self.record(&outcome);
                    errors.extend(outcome.errors);
                }
                Err(e) => {
                    log::warn!("Pressure sample {} failed: {}", descriptor, e);
                    errors.extend(failure_records(descriptor, &e));
                }
            }
        }
    }

    /// Mean reading per sensor; sensors without a valid sample are left out
    pub fn compose(&self, at: DateTime<Utc>) -> Vec<Reading> {
        self.sensor_ids()
            .into_iter()
            .filter_map(|sensor_id| {
                let samples = self.samples.get(&sensor_id)?;
                if samples.values.is_empty() {
                    return None;
                }
                Some(Reading::new(
                    sensor_id,
                    ReadingType::PressureWideAverage,
                    mean(&samples.values),
                    mean(&samples.raws),
                    at,
                ))
            })
            .collect()
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::error::{MidError, MidResult};
    use mid_core::ErrorCode;
    use mid_protocol::{ChannelConfig, UnitCommand, UnitConfig};

    fn port(port: u8, ids: &[(u16, SensorId)]) -> CommandDescriptor {
        CommandDescriptor::new(
            UnitCommand::PressureWide,
            port,
            ids.iter()
                .map(|&(address, id)| UnitConfig::new(address).channel(ChannelConfig::new(id)))
                .collect(),
        )
    }

    /// Answers alternate sampling rounds of two ports with 1010 and 1000
    struct Sampler {
        calls: usize,
        fail_port: Option<u8>,
    }

    #[async_trait]
    impl CommandExchange for Sampler {
        async fn exchange(
            &mut self,
            descriptor: &CommandDescriptor,
            at: DateTime<Utc>,
        ) -> MidResult<CommandOutcome> {
            self.calls += 1;
            if self.fail_port == Some(descriptor.port) {
                return Err(MidError::Timeout);
            }
            let readings = descriptor
                .sensor_ids()
                .into_iter()
                .map(|id| {
                    let raw = 1000.0 + ((self.calls - 1) / 2 % 2) as f64 * 10.0;
                    Reading::new(id, ReadingType::PressureWide, raw / 10.0, raw, at)
                })
                .collect();
            Ok(CommandOutcome {
                readings,
                ..CommandOutcome::default()
            })
        }
    }

    #[test]
    fn test_sample_commands_are_sample_major() {
        let average = PressureAverage::new(vec![port(1, &[(5, 1), (6, 2)]), port(3, &[(7, 3), (8, 4)])]);
        let commands = average.sample_commands();
        assert_eq!(commands.len(), 2 * PRESSURE_SAMPLES_PER_READING);
        assert_eq!(average.command_count(), 2 * PRESSURE_SAMPLES_PER_READING + 1);
        assert_eq!(commands[0].port, 1);
        assert_eq!(commands[1].port, 3);
        assert_eq!(commands[2].port, 1);
    }

    #[tokio::test]
    async fn test_only_averages_are_reported() {
        let mut average =
            PressureAverage::new(vec![port(1, &[(5, 1), (6, 2)]), port(3, &[(7, 3), (8, 4)])]);
        let mut link = Sampler { calls: 0, fail_port: None };
        let mut errors = ErrorResponse::new();
        let at = Utc::now();

        average.run(&mut link, at, &mut errors).await;
        assert_eq!(link.calls, 20);
        assert!(errors.is_empty());

        let readings = average.compose(at);
        assert_eq!(readings.len(), 4);
        for reading in &readings {
            assert_eq!(reading.kind, ReadingType::PressureWideAverage);
            assert_eq!(average.sample_count(reading.sensor_id), 10);
            assert!((reading.raw.unwrap() - 1005.0).abs() < 1e-9);
            assert!((reading.value.unwrap() - 100.5).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_failed_port_is_skipped() {
        let mut average = PressureAverage::new(vec![port(1, &[(5, 1)]), port(2, &[(6, 2)])]);
        let mut link = Sampler { calls: 0, fail_port: Some(2) };
        let mut errors = ErrorResponse::new();
        let at = Utc::now();

        average.run(&mut link, at, &mut errors).await;
        let readings = average.compose(at);
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].sensor_id, 1);
        assert_eq!(errors.count_of(ErrorCode::TIMEOUT), 10);
    }
}

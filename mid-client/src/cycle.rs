//! Running a reading cycle
//!
//! A cycle walks the plan once. No failure stops the cycle: failed commands
//! are turned into error records and the next step runs.

use crate::plan::{CyclePlan, PlanStep};
use chrono::{DateTime, Utc};
use mid_core::{ErrorResponse, Reading};
use mid_session::{failure_records, CommandExchange};
use std::time::Duration;
use tokio::time::Instant;

/// Default minimum time between the starts of two cycles
pub const DEFAULT_MIN_CYCLE_INTERVAL: Duration = Duration::from_secs(60);

/// Everything one cycle produced
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started: DateTime<Utc>,
    pub readings: Vec<Reading>,
    pub errors: ErrorResponse,
    pub elapsed: Duration,
}

impl CycleReport {
    pub fn valid_count(&self) -> usize {
        self.readings.iter().filter(|r| r.is_valid()).count()
    }
}

/// Run every step of the plan against a link
///
/// All readings of the cycle carry the cycle start time.
pub async fn run_cycle<E>(link: &mut E, plan: &mut CyclePlan) -> CycleReport
where
    E: CommandExchange + ?Sized,
{
    let clock = Instant::now();
    let started = Utc::now();
    let mut readings = Vec::new();
    let mut errors = ErrorResponse::new();

    for step in plan.steps_mut() {
        log::debug!("Cycle step: {}", step);
        match step {
            PlanStep::Command(descriptor) => match link.exchange(descriptor, started).await {
                Ok(outcome) => {
                    readings.extend(outcome.readings);
                    errors.extend(outcome.errors);
                }
                Err(e) => {
                    log::warn!("Command failed: {}: {}", descriptor, e);
                    errors.extend(failure_records(descriptor, &e));
                }
            },
            PlanStep::PressureAverage(average) => {
                average.run(link, started, &mut errors).await;
                readings.extend(average.compose(started));
            }
            PlanStep::MultiPoint(session) => {
                session.run(link, started, &mut errors).await;
                readings.extend(session.compose(started));
            }
        }
    }

    let report = CycleReport {
        started,
        readings,
        errors,
        elapsed: clock.elapsed(),
    };
    log::info!(
        "Cycle done in {:?}: {} reading(s), {} valid, {} error record(s)",
        report.elapsed,
        report.readings.len(),
        report.valid_count(),
        report.errors.len()
    );
    report
}

/// Keeps cycles at least a minimum interval apart
///
/// An in-flight command is never cancelled; a cycle that overruns the
/// interval is only logged.
#[derive(Debug, Clone, Copy)]
pub struct CyclePacer {
    min_interval: Duration,
}

impl CyclePacer {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Time left to wait after a cycle that took `elapsed`
    pub fn remaining(&self, elapsed: Duration) -> Option<Duration> {
        self.min_interval
            .checked_sub(elapsed)
            .filter(|left| !left.is_zero())
    }

    /// Sleep out the rest of the interval
    pub async fn pace(&self, elapsed: Duration) {
        match self.remaining(elapsed) {
            Some(left) => {
                log::debug!("Sleeping {:?} until the next cycle", left);
                tokio::time::sleep(left).await;
            }
            None => log::warn!(
                "Cycle took {:?}, longer than the {:?} interval; starting the next one now",
                elapsed,
                self.min_interval
            ),
        }
    }
}

impl Default for CyclePacer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CYCLE_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use crate::error::{MidError, MidResult};
    use async_trait::async_trait;
    use mid_core::{ErrorCode, ReadingType};
    use mid_protocol::{CommandDescriptor, CommandOutcome, RawUnit, UnitCommand, EMPTY_SLOT};

    /// Hub stand-in: tach and pressure answer, temp/hum times out,
    /// multi-point cables hold one probe
    #[derive(Default)]
    struct ScriptedHub {
        sent: Vec<CommandDescriptor>,
        enumerated: usize,
        /// Time out the enumerate of the second slot
        drop_second_slot: bool,
    }

    #[async_trait]
    impl CommandExchange for ScriptedHub {
        async fn exchange(
            &mut self,
            descriptor: &CommandDescriptor,
            at: DateTime<Utc>,
        ) -> MidResult<CommandOutcome> {
            self.sent.push(descriptor.clone());
            let unit = |field: u64| RawUnit {
                address: descriptor.units[0].address,
                fields: vec![field],
            };
            match descriptor.command {
                UnitCommand::TempHum => Err(MidError::Timeout),
                UnitCommand::Tach | UnitCommand::PressureWide => Ok(CommandOutcome {
                    readings: descriptor
                        .sensor_ids()
                        .into_iter()
                        .map(|id| Reading::new(id, ReadingType::Tach, 42.0, 42.0, at))
                        .collect(),
                    ..CommandOutcome::default()
                }),
                UnitCommand::MultiPointReset => Ok(CommandOutcome {
                    units: vec![unit(1)],
                    ..CommandOutcome::default()
                }),
                UnitCommand::MultiPointAddress(_) => {
                    self.enumerated += 1;
                    if self.drop_second_slot && self.enumerated == 2 {
                        return Err(MidError::Timeout);
                    }
                    let field = if self.enumerated == 1 { 0xA1 } else { EMPTY_SLOT };
                    Ok(CommandOutcome {
                        units: vec![unit(field)],
                        ..CommandOutcome::default()
                    })
                }
                UnitCommand::MultiPointRead(_) => Ok(CommandOutcome {
                    units: vec![unit(0x0191)],
                    ..CommandOutcome::default()
                }),
                other => Err(MidError::UnparsableReply(format!("unexpected {}", other))),
            }
        }
    }

    const CONFIG: &str = r#"{"commandInfo": [
        {"type": "temp_rh", "temp_id": 1, "rh_id": 2, "port": 1, "addy": 1},
        {"type": "tach", "sensor_id": 3, "port": 2, "addy": 2},
        {"type": "pressure", "sensor_id": 4, "port": 3, "addy": 3},
        {"type": "MP_T", "sensor_id": 5, "port": 4, "addy": 4,
         "sensor_extra_info": "{\"ch\": 1, \"addrs\": [\"a1\"]}"},
        {"type": "MP_T", "sensor_id": 6, "port": 4, "addy": 4,
         "sensor_extra_info": "{\"ch\": 1, \"addrs\": [\"b2\"]}"}
    ]}"#;

    #[tokio::test]
    async fn test_cycle_collects_everything() {
        let mut plan = CyclePlan::from_config(&HubConfig::from_json(CONFIG).unwrap());
        let mut hub = ScriptedHub::default();

        let report = run_cycle(&mut hub, &mut plan).await;
        assert_eq!(hub.sent.len(), plan.command_count() - 1);

        // temp/hum timed out for both sensors
        assert_eq!(report.errors.count_of(ErrorCode::TIMEOUT), 2);

        let ids: Vec<_> = report.readings.iter().map(|r| r.sensor_id).collect();
        assert_eq!(ids, vec![4, 3, 5, 6]);
        assert_eq!(report.readings[0].kind, ReadingType::PressureWideAverage);
        assert!(report.readings[2].is_valid());
        assert_eq!(report.readings[3].error_code, Some(ErrorCode::MISSING));
        assert_eq!(report.valid_count(), 3);
        assert!(report.readings.iter().all(|r| r.timestamp == report.started));
    }

    #[tokio::test]
    async fn test_multi_point_slot_failure_keeps_cable() {
        let mut plan = CyclePlan::from_config(&HubConfig::from_json(CONFIG).unwrap());
        let mut hub = ScriptedHub {
            drop_second_slot: true,
            ..ScriptedHub::default()
        };

        let report = run_cycle(&mut hub, &mut plan).await;
        assert_eq!(hub.sent.len(), plan.command_count() - 1);
        assert_eq!(hub.sent.last().map(|d| d.command), Some(UnitCommand::MultiPointReset));

        let answered = report.readings.iter().find(|r| r.sensor_id == 5).unwrap();
        assert!(answered.is_valid());
        // temp/hum pair plus sensor 6, which no probe answered for
        assert_eq!(report.errors.count_of(ErrorCode::TIMEOUT), 3);
    }

    #[tokio::test]
    async fn test_empty_plan() {
        let mut plan = CyclePlan::default();
        let mut hub = ScriptedHub::default();
        let report = run_cycle(&mut hub, &mut plan).await;
        assert!(report.readings.is_empty());
        assert!(report.errors.is_empty());
        assert!(hub.sent.is_empty());
    }

    #[test]
    fn test_pacer_remaining() {
        let pacer = CyclePacer::new(Duration::from_secs(60));
        assert_eq!(pacer.remaining(Duration::from_secs(45)), Some(Duration::from_secs(15)));
        assert_eq!(pacer.remaining(Duration::from_secs(60)), None);
        assert_eq!(pacer.remaining(Duration::from_secs(90)), None);
    }

    #[tokio::test]
    async fn test_pacer_sleeps_remainder() {
        let pacer = CyclePacer::new(Duration::from_millis(30));
        let start = Instant::now();
        pacer.pace(Duration::from_millis(10)).await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}

//! Hub client: one link, one plan, paced reading cycles

use crate::config::HubConfig;
use crate::cycle::{run_cycle, CyclePacer, CycleReport};
use crate::error::MidResult;
use crate::plan::CyclePlan;
use mid_protocol::{CalibrationReply, UnitCommand};
use mid_session::{HubLink, SessionStatistics};
use mid_transport::HubTransport;

/// A configured connection to one hub
///
/// Create it with [`HubClientBuilder`](crate::HubClientBuilder).
pub struct HubClient {
    link: HubLink<HubTransport>,
    plan: CyclePlan,
    pacer: CyclePacer,
}

impl HubClient {
    pub fn new(link: HubLink<HubTransport>, pacer: CyclePacer) -> Self {
        Self {
            link,
            plan: CyclePlan::default(),
            pacer,
        }
    }

    pub async fn open(&mut self) -> MidResult<()> {
        self.link.session_mut().open().await
    }

    pub async fn close(&mut self) -> MidResult<()> {
        self.link.session_mut().close().await
    }

    pub fn is_closed(&self) -> bool {
        self.link.session().is_closed()
    }

    /// Replace the cycle plan with one built from `config`
    pub fn configure(&mut self, config: &HubConfig) {
        self.plan = CyclePlan::from_config(config);
    }

    /// Parse the server configuration JSON and plan from it
    pub fn configure_json(&mut self, json: &str) -> MidResult<()> {
        let config = HubConfig::from_json(json)?;
        self.configure(&config);
        Ok(())
    }

    pub fn plan(&self) -> &CyclePlan {
        &self.plan
    }

    pub fn pacer(&self) -> &CyclePacer {
        &self.pacer
    }

    pub fn statistics(&self) -> &SessionStatistics {
        self.link.statistics()
    }

    pub fn link_mut(&mut self) -> &mut HubLink<HubTransport> {
        &mut self.link
    }

    /// Run one reading cycle right away
    pub async fn run_cycle(&mut self) -> CycleReport {
        if self.plan.is_empty() {
            log::info!("No sensors configured; the cycle reads nothing");
        }
        run_cycle(&mut self.link, &mut self.plan).await
    }

    /// Run one reading cycle, then wait out the rest of the cycle interval
    pub async fn run_paced_cycle(&mut self) -> CycleReport {
        let report = self.run_cycle().await;
        self.pacer.pace(report.elapsed).await;
        report
    }

    /// Check the hub answers; `true` when the pong matches
    pub async fn ping(&mut self) -> MidResult<bool> {
        self.link.session_mut().ping(None).await
    }

    pub async fn hub_version(&mut self) -> MidResult<f64> {
        self.link.session_mut().hub_version().await
    }

    pub async fn unit_versions(
        &mut self,
        port: u8,
        addresses: &[u16],
    ) -> MidResult<Vec<(u16, Option<f64>)>> {
        self.link.session_mut().unit_versions(port, addresses).await
    }

    pub async fn get_calibration(
        &mut self,
        command: UnitCommand,
        port: u8,
        addresses: &[u16],
    ) -> MidResult<CalibrationReply> {
        self.link
            .session_mut()
            .get_calibration(command, port, addresses)
            .await
    }

    pub async fn set_calibration(
        &mut self,
        command: UnitCommand,
        port: u8,
        address: u16,
        value: i64,
    ) -> MidResult<CalibrationReply> {
        self.link
            .session_mut()
            .set_calibration(command, port, address, value)
            .await
    }
}

//! Hub client builder
//!
//! ```rust,no_run
//! use mid_client::HubClientBuilder;
//! use std::time::Duration;
//!
//! # async fn run() -> mid_client::MidResult<()> {
//! let mut client = HubClientBuilder::new()
//!     .serial("/dev/ttyUSB0", 9600)
//!     .reply_timeout_per_address(Duration::from_secs(5))
//!     .min_cycle_interval(Duration::from_secs(120))
//!     .build()?;
//! client.open().await?;
//! let report = client.run_paced_cycle().await;
//! # Ok(())
//! # }
//! ```

use crate::client::HubClient;
use crate::cycle::{CyclePacer, DEFAULT_MIN_CYCLE_INTERVAL};
use crate::error::{MidError, MidResult};
use mid_protocol::{FormulaEvaluator, SafeFormulaEvaluator, SmoothingWindows, SMOOTHING_WINDOW};
use mid_session::{HubLink, HubSession, SessionSettings};
use mid_transport::{HubTransport, MemoryTransport, SerialSettings, SerialTransport, UdpTransport};
use std::fmt;
use std::time::Duration;

/// Builder for [`HubClient`]
///
/// A transport must be chosen; everything else has a default: 10 s reply
/// timeout per address, 60 s cycle interval, the sandboxed formula
/// evaluator and a 30-value smoothing window.
pub struct HubClientBuilder {
    transport_type: TransportType,
    reply_timeout_per_address: Option<Duration>,
    min_cycle_interval: Duration,
    evaluator: Option<Box<dyn FormulaEvaluator>>,
    smoothing_window: usize,
}

enum TransportType {
    Serial { port_name: String, baud_rate: u32 },
    Udp { local: String, hub: String },
    Memory(MemoryTransport),
    None,
}

impl HubClientBuilder {
    pub fn new() -> Self {
        Self {
            transport_type: TransportType::None,
            reply_timeout_per_address: None,
            min_cycle_interval: DEFAULT_MIN_CYCLE_INTERVAL,
            evaluator: None,
            smoothing_window: SMOOTHING_WINDOW,
        }
    }

    /// Hub on a serial line (e.g. "/dev/ttyUSB0", 9600)
    pub fn serial(mut self, port_name: &str, baud_rate: u32) -> Self {
        self.transport_type = TransportType::Serial {
            port_name: port_name.to_string(),
            baud_rate,
        };
        self
    }

    /// Hub reached over UDP; both addresses as "host:port"
    pub fn udp(mut self, local: &str, hub: &str) -> Self {
        self.transport_type = TransportType::Udp {
            local: local.to_string(),
            hub: hub.to_string(),
        };
        self
    }

    /// Scripted in-memory hub, for simulators and tests
    pub fn memory(mut self, transport: MemoryTransport) -> Self {
        self.transport_type = TransportType::Memory(transport);
        self
    }

    pub fn reply_timeout_per_address(mut self, timeout: Duration) -> Self {
        self.reply_timeout_per_address = Some(timeout);
        self
    }

    pub fn min_cycle_interval(mut self, interval: Duration) -> Self {
        self.min_cycle_interval = interval;
        self
    }

    pub fn evaluator(mut self, evaluator: Box<dyn FormulaEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Values averaged by smoothed channels
    pub fn smoothing_window(mut self, size: usize) -> Self {
        self.smoothing_window = size;
        self
    }

    /// Build the client; the link is opened by [`HubClient::open`]
    pub fn build(self) -> MidResult<HubClient> {
        let (transport, settings) = match self.transport_type {
            TransportType::Serial {
                port_name,
                baud_rate,
            } => (
                HubTransport::Serial(SerialTransport::new(SerialSettings::new(
                    port_name, baud_rate,
                ))),
                SessionSettings::serial(),
            ),
            TransportType::Udp { local, hub } => (
                HubTransport::Udp(UdpTransport::from_addresses(&local, &hub)?),
                SessionSettings::udp(),
            ),
            TransportType::Memory(memory) => (HubTransport::Memory(memory), SessionSettings::udp()),
            TransportType::None => {
                return Err(MidError::InvalidData(
                    "Transport type not configured".to_string(),
                ));
            }
        };
        let settings = match self.reply_timeout_per_address {
            Some(timeout) => settings.with_reply_timeout_per_address(timeout),
            None => settings,
        };

        let evaluator = self
            .evaluator
            .unwrap_or_else(|| Box::new(SafeFormulaEvaluator::new()));
        let link = HubLink::new(HubSession::new(transport, settings), evaluator)
            .with_windows(SmoothingWindows::with_size(self.smoothing_window));
        Ok(HubClient::new(link, CyclePacer::new(self.min_cycle_interval)))
    }
}

impl Default for HubClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HubClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let transport = match &self.transport_type {
            TransportType::Serial { port_name, .. } => port_name.as_str(),
            TransportType::Udp { hub, .. } => hub.as_str(),
            TransportType::Memory(_) => "memory",
            TransportType::None => "none",
        };
        f.debug_struct("HubClientBuilder")
            .field("transport", &transport)
            .field("reply_timeout_per_address", &self.reply_timeout_per_address)
            .field("min_cycle_interval", &self.min_cycle_interval)
            .field("smoothing_window", &self.smoothing_window)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TACH_CONFIG: &str = r#"{"commandInfo": [
        {"type": "tach", "sensor_id": 70, "port": 5, "addy": 30}
    ]}"#;

    #[test]
    fn test_build_without_transport() {
        let result = HubClientBuilder::new().build();
        assert!(matches!(result, Err(MidError::InvalidData(_))));
    }

    #[test]
    fn test_build_with_bad_udp_address() {
        let result = HubClientBuilder::new().udp("not an address", "10.0.0.2:2000").build();
        assert!(matches!(result, Err(MidError::Config(_))));
    }

    #[tokio::test]
    async fn test_memory_client_cycle() {
        let hub = MemoryTransport::new().reply(vec![1, 3, 3, 1, 0x2C, 0x01]);
        let mut client = HubClientBuilder::new()
            .memory(hub)
            .min_cycle_interval(Duration::from_millis(1))
            .build()
            .unwrap();
        client.open().await.unwrap();
        client.configure_json(TACH_CONFIG).unwrap();
        assert_eq!(client.plan().command_count(), 1);

        let report = client.run_paced_cycle().await;
        assert_eq!(report.readings.len(), 1);
        assert_eq!(report.readings[0].sensor_id, 70);
        assert_eq!(report.readings[0].value, Some(300.0));
        assert_eq!(client.statistics().commands_sent, 1);

        // nothing left to answer the second cycle
        let report = client.run_cycle().await;
        assert!(report.readings.is_empty());
        assert_eq!(report.errors.len(), 1);
        client.close().await.unwrap();
        assert!(client.is_closed());
    }
}

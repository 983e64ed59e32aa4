//! Hub session: one command out, one reply back

use crate::error::{MidError, MidResult};
use crate::settings::{ReplyFraming, SessionSettings};
use crate::statistics::SessionStatistics;
use mid_protocol::frame::{GET_CALIBRATION, SET_CALIBRATION};
use mid_protocol::reply::{read_hub_version, read_pong};
use mid_protocol::{
    read_calibration_reply, version_from_raw, CalibrationReply, CommandDescriptor, CommandOutcome,
    Conversion, ReplyMatcher, ReplyReader, RequestFrame, SafeFormulaEvaluator, SmoothingWindows,
    UnitCommand,
};
use mid_transport::TransportLayer;

/// Check a pong against the nonce that was pinged
pub fn pong_matches(nonce: u16, pong: u16) -> bool {
    pong == nonce.wrapping_add(1)
}

/// Session with a hub over any transport
///
/// Commands are strictly sequential: a command is written only after the
/// reply to the previous one was read or timed out. After any failed exchange
/// the input buffer is flushed before the next command goes out.
#[derive(Debug)]
pub struct HubSession<T: TransportLayer> {
    transport: T,
    settings: SessionSettings,
    statistics: SessionStatistics,
    resync_pending: bool,
    closed: bool,
}

impl<T: TransportLayer> HubSession<T> {
    pub fn new(transport: T, settings: SessionSettings) -> Self {
        Self {
            transport,
            settings,
            statistics: SessionStatistics::new(),
            resync_pending: false,
            closed: true,
        }
    }

    /// Open the underlying transport
    pub async fn open(&mut self) -> MidResult<()> {
        self.transport.open().await?;
        self.closed = false;
        Ok(())
    }

    pub async fn close(&mut self) -> MidResult<()> {
        if !self.closed {
            self.transport.close().await?;
            self.closed = true;
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed || self.transport.is_closed()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn statistics(&self) -> &SessionStatistics {
        &self.statistics
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Force an input flush before the next command
    pub fn request_resync(&mut self) {
        self.resync_pending = true;
    }

    /// Send an encoded frame and read the whole reply
    pub async fn request(&mut self, frame: &[u8], address_count: usize) -> MidResult<Vec<u8>> {
        if self.closed {
            return Err(MidError::Connection(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "Hub session is closed",
            )));
        }

        if self.resync_pending {
            self.transport.clear_input().await?;
            self.statistics.increment_resyncs();
            self.resync_pending = false;
        } else if self.settings.clear_before_send {
            self.transport.clear_input().await?;
        }

        let timeout = self.settings.reply_timeout(address_count);
        self.transport.set_timeout(Some(timeout)).await?;

        log::debug!("-> {:02X?}", frame);
        self.transport.write_all(frame).await?;
        self.transport.flush().await?;
        self.statistics.increment_commands_sent();

        match self.read_reply().await {
            Ok(reply) if !reply.is_empty() => {
                log::debug!("<- {:02X?}", reply);
                self.statistics.increment_replies_received();
                Ok(reply)
            }
            Ok(_) => {
                self.resync_pending = true;
                Err(MidError::EmptyReply)
            }
            Err(e) => {
                if matches!(e, MidError::Timeout) {
                    self.statistics.increment_timeouts();
                }
                self.resync_pending = true;
                Err(e)
            }
        }
    }

    async fn read_reply(&mut self) -> MidResult<Vec<u8>> {
        match self.settings.framing {
            ReplyFraming::LengthPrefixed => {
                let mut prefix = [0u8; 2];
                self.transport.read_exact(&mut prefix).await?;
                let total = u16::from_le_bytes(prefix) as usize;
                if total < prefix.len() {
                    return Err(MidError::ReplyParse(format!(
                        "Length prefix {} shorter than itself",
                        total
                    )));
                }
                let mut reply = vec![0u8; total - prefix.len()];
                self.transport.read_exact(&mut reply).await?;
                Ok(reply)
            }
            ReplyFraming::Datagram => {
                let mut reply = vec![0u8; self.settings.max_datagram_size];
                let n = self.transport.read(&mut reply).await?;
                reply.truncate(n);
                Ok(reply)
            }
        }
    }

    /// Run one command descriptor through the hub and interpret the reply
    pub async fn exchange(
        &mut self,
        descriptor: &CommandDescriptor,
        ctx: &mut Conversion<'_>,
    ) -> MidResult<CommandOutcome> {
        let frame = descriptor.encode()?;
        log::debug!("Sending {}", descriptor);
        let reply = self.request(&frame, descriptor.address_count()).await?;

        match ReplyMatcher::new(descriptor).process(&reply, ctx) {
            Ok(outcome) => {
                if !outcome.rejected.is_empty() {
                    self.statistics
                        .add_framing_errors(outcome.rejected.len() as u64);
                    self.resync_pending = true;
                }
                Ok(outcome)
            }
            Err(e) => {
                self.statistics.add_framing_errors(1);
                self.resync_pending = true;
                Err(e)
            }
        }
    }

    /// Ping the hub; `None` picks a random nonce
    pub async fn ping(&mut self, nonce: Option<u16>) -> MidResult<bool> {
        let nonce = nonce.unwrap_or_else(rand::random);
        let frame = RequestFrame::Ping { nonce }.encode()?;
        let reply = self.request(&frame, 1).await?;
        let pong = self.checked(read_pong(&mut ReplyReader::new(&reply)))?;
        let matched = pong_matches(nonce, pong);
        if !matched {
            log::warn!("Ping {} answered with {}", nonce, pong);
        }
        Ok(matched)
    }

    /// Read the hub firmware version
    pub async fn hub_version(&mut self) -> MidResult<f64> {
        let frame = RequestFrame::HubVersion {
            nonce: rand::random(),
        }
        .encode()?;
        let reply = self.request(&frame, 1).await?;
        let raw = self.checked(read_hub_version(&mut ReplyReader::new(&reply)))?;
        Ok(version_from_raw(raw))
    }

    /// Read the firmware version of each unit; `None` for units that did not answer
    pub async fn unit_versions(
        &mut self,
        port: u8,
        addresses: &[u16],
    ) -> MidResult<Vec<(u16, Option<f64>)>> {
        let descriptor = CommandDescriptor::bare(UnitCommand::UnitVersion, port, addresses);
        let evaluator = SafeFormulaEvaluator::new();
        let mut windows = SmoothingWindows::new();
        let mut ctx = Conversion::new(&evaluator, &mut windows, chrono::Utc::now());
        let outcome = self.exchange(&descriptor, &mut ctx).await?;

        if !outcome.has_readings_packet() {
            return Err(outcome.rejected.into_iter().next().unwrap_or_else(|| {
                MidError::ReplyParse(format!("No version data in reply to {}", descriptor))
            }));
        }

        Ok(outcome
            .units
            .iter()
            .map(|unit| {
                let version = match unit.field(0) {
                    Some(0) | None => None,
                    Some(raw) => Some(version_from_raw(raw as u16)),
                };
                (unit.address, version)
            })
            .collect())
    }

    /// Read the calibration value of each unit
    pub async fn get_calibration(
        &mut self,
        command: UnitCommand,
        port: u8,
        addresses: &[u16],
    ) -> MidResult<CalibrationReply> {
        let size = command.calibration_size();
        let frame = RequestFrame::GetCalibration {
            command,
            size,
            port,
            addresses: addresses.to_vec(),
        }
        .encode()?;
        let reply = self.request(&frame, addresses.len()).await?;
        let decoded = read_calibration_reply(&reply, GET_CALIBRATION, addresses.len(), size);
        self.checked(decoded)
    }

    /// Write the calibration value of one unit; the hub echoes the stored value
    pub async fn set_calibration(
        &mut self,
        command: UnitCommand,
        port: u8,
        address: u16,
        value: i64,
    ) -> MidResult<CalibrationReply> {
        let size = command.calibration_size();
        let frame = RequestFrame::SetCalibration {
            command,
            size,
            port,
            address,
            value,
        }
        .encode()?;
        let reply = self.request(&frame, 1).await?;
        let decoded = read_calibration_reply(&reply, SET_CALIBRATION, 1, size);
        self.checked(decoded)
    }

    fn checked<V>(&mut self, decoded: MidResult<V>) -> MidResult<V> {
        if let Err(e) = &decoded {
            log::warn!("Unexpected reply: {}", e);
            self.statistics.add_framing_errors(1);
            self.resync_pending = true;
        }
        decoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mid_protocol::{ChannelConfig, UnitConfig};
    use mid_transport::MemoryTransport;
    use std::time::Duration;

    fn prefixed(packets: &[u8]) -> Vec<u8> {
        let mut reply = ((packets.len() + 2) as u16).to_le_bytes().to_vec();
        reply.extend_from_slice(packets);
        reply
    }

    async fn open(transport: MemoryTransport, settings: SessionSettings) -> HubSession<MemoryTransport> {
        let mut session = HubSession::new(transport, settings);
        session.open().await.unwrap();
        session
    }

    fn wind_descriptor() -> CommandDescriptor {
        CommandDescriptor::new(
            UnitCommand::Wind,
            2,
            vec![
                UnitConfig::new(1).channel(ChannelConfig::new(20)),
                UnitConfig::new(2).channel(ChannelConfig::new(21)),
            ],
        )
    }

    #[test]
    fn test_pong_matches() {
        assert!(pong_matches(123, 124));
        assert!(!pong_matches(123, 125));
        assert!(pong_matches(u16::MAX, 0));
    }

    #[tokio::test]
    async fn test_ping() {
        let transport = MemoryTransport::new()
            .reply(prefixed(&[3, 124, 0]))
            .reply(prefixed(&[3, 125, 0]));
        let mut session = open(transport, SessionSettings::serial()).await;

        assert!(session.ping(Some(123)).await.unwrap());
        assert!(!session.ping(Some(123)).await.unwrap());
        assert_eq!(
            session.transport().written()[0],
            vec![b'D', b'E', b'R', b'V', 130, 123, 0]
        );
        assert_eq!(session.statistics().replies_received, 2);
    }

    #[tokio::test]
    async fn test_hub_version_over_datagrams() {
        let transport = MemoryTransport::new().reply(vec![5, 20, 0]);
        let mut session = open(transport, SessionSettings::udp()).await;
        let version = session.hub_version().await.unwrap();
        assert!((version - 3.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_exchange_with_chunked_reply() {
        let reply = prefixed(&[1, 5, 2, 2, 10, 0, 20, 0]);
        let transport = MemoryTransport::new()
            .reply_chunks(vec![reply[..3].to_vec(), reply[3..].to_vec()]);
        let mut session = open(transport, SessionSettings::serial()).await;

        let evaluator = SafeFormulaEvaluator::new();
        let mut windows = SmoothingWindows::new();
        let mut ctx = Conversion::new(&evaluator, &mut windows, chrono::Utc::now());
        let outcome = session.exchange(&wind_descriptor(), &mut ctx).await.unwrap();

        assert_eq!(outcome.readings.len(), 2);
        assert_eq!(outcome.readings[1].value, Some(20.0));
        assert_eq!(session.transport().timeout(), Some(Duration::from_secs(20)));
    }

    #[tokio::test]
    async fn test_timeout_then_resync() {
        let transport = MemoryTransport::new()
            .silence()
            .reply(vec![3, 8, 0]);
        let settings = SessionSettings::udp();
        let mut session = open(transport, settings).await;

        assert!(matches!(session.ping(Some(1)).await, Err(MidError::Timeout)));
        assert_eq!(session.transport().clear_count(), 0);

        assert!(!session.ping(Some(1)).await.unwrap());
        assert_eq!(session.transport().clear_count(), 1);
        assert_eq!(session.statistics().timeouts, 1);
        assert_eq!(session.statistics().resyncs, 1);
    }

    #[tokio::test]
    async fn test_unparsable_reply_requests_resync() {
        let transport = MemoryTransport::new()
            .reply(prefixed(&[9, 9, 9]))
            .reply(prefixed(&[3, 2, 0]));
        let mut session = open(transport, SessionSettings::serial()).await;

        let evaluator = SafeFormulaEvaluator::new();
        let mut windows = SmoothingWindows::new();
        let mut ctx = Conversion::new(&evaluator, &mut windows, chrono::Utc::now());
        let result = session.exchange(&wind_descriptor(), &mut ctx).await;
        assert!(matches!(result, Err(MidError::UnparsableReply(_))));

        assert!(session.ping(Some(1)).await.unwrap());
        assert_eq!(session.statistics().framing_errors, 1);
        assert_eq!(session.statistics().resyncs, 1);
        // serial sessions also clear before every command
        assert_eq!(session.transport().clear_count(), 2);
    }

    #[tokio::test]
    async fn test_stale_input_is_discarded() {
        let transport = MemoryTransport::new()
            .stale_input(vec![0xAA, 0xBB])
            .reply(prefixed(&[3, 11, 0]));
        let mut session = open(transport, SessionSettings::serial()).await;
        assert!(session.ping(Some(10)).await.unwrap());
    }

    #[tokio::test]
    async fn test_unit_versions() {
        let transport = MemoryTransport::new().reply(prefixed(&[1, 5, 63, 2, 12, 0, 0, 0]));
        let mut session = open(transport, SessionSettings::serial()).await;
        let versions = session.unit_versions(1, &[4, 5]).await.unwrap();
        assert_eq!(versions[0].0, 4);
        assert!((versions[0].1.unwrap() - 3.12).abs() < 1e-9);
        assert_eq!(versions[1], (5, None));
    }

    #[tokio::test]
    async fn test_calibration_round_trip() {
        let transport = MemoryTransport::new()
            .reply(prefixed(&[1, 5, GET_CALIBRATION, 1, 0xF6, 0xFF, 0xFF, 0xFF]))
            .reply(prefixed(&[1, 5, SET_CALIBRATION, 1, 0x0A, 0, 0, 0]));
        let mut session = open(transport, SessionSettings::serial()).await;

        let read = session
            .get_calibration(UnitCommand::PressureWide, 3, &[8])
            .await
            .unwrap();
        assert_eq!(read.values, vec![-10]);

        let written = session
            .set_calibration(UnitCommand::PressureWide, 3, 8, 10)
            .await
            .unwrap();
        assert_eq!(written.values, vec![10]);
        assert_eq!(
            session.transport().written()[1],
            vec![b'D', b'E', b'R', b'V', 65, 8, 4, 3, 8, 0, 10, 0, 0, 0]
        );
    }

    #[test]
    fn test_closed_session_rejects_requests() {
        let mut session = HubSession::new(MemoryTransport::new(), SessionSettings::serial());
        let result = tokio_test::block_on(session.request(&[1], 1));
        assert!(matches!(result, Err(MidError::Connection(_))));
    }
}

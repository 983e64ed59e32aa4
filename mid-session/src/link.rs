//! Command exchange seam between the session and the reading cycle

use crate::error::{MidError, MidResult};
use crate::session::HubSession;
use crate::statistics::SessionStatistics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mid_core::ErrorResponse;
use mid_protocol::{CommandDescriptor, CommandOutcome, Conversion, FormulaEvaluator, SmoothingWindows};
use mid_transport::TransportLayer;

/// Anything that can run one command descriptor against a hub
#[async_trait]
pub trait CommandExchange: Send {
    /// Send the command and interpret its reply
    ///
    /// `at` is the timestamp given to every reading of the reply.
    async fn exchange(
        &mut self,
        descriptor: &CommandDescriptor,
        at: DateTime<Utc>,
    ) -> MidResult<CommandOutcome>;
}

/// Error records for a command whose exchange failed as a whole
///
/// Transport failures become timeout records, anything else parse records,
/// for every sensor the command covers.
pub fn failure_records(descriptor: &CommandDescriptor, error: &MidError) -> ErrorResponse {
    let mut errors = ErrorResponse::new();
    if error.is_transport() {
        errors.add_timeout_errors(descriptor.sensor_ids());
    } else {
        errors.add_parse_errors(descriptor.sensor_ids());
    }
    errors
}

/// A hub session plus the conversion state that outlives single commands
pub struct HubLink<T: TransportLayer> {
    session: HubSession<T>,
    evaluator: Box<dyn FormulaEvaluator>,
    windows: SmoothingWindows,
}

impl<T: TransportLayer> HubLink<T> {
    pub fn new(session: HubSession<T>, evaluator: Box<dyn FormulaEvaluator>) -> Self {
        Self {
            session,
            evaluator,
            windows: SmoothingWindows::new(),
        }
    }

    pub fn with_windows(mut self, windows: SmoothingWindows) -> Self {
        self.windows = windows;
        self
    }

    pub fn session(&self) -> &HubSession<T> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut HubSession<T> {
        &mut self.session
    }

    pub fn statistics(&self) -> &SessionStatistics {
        self.session.statistics()
    }

    pub fn windows(&self) -> &SmoothingWindows {
        &self.windows
    }
}

#[async_trait]
impl<T: TransportLayer> CommandExchange for HubLink<T> {
    async fn exchange(
        &mut self,
        descriptor: &CommandDescriptor,
        at: DateTime<Utc>,
    ) -> MidResult<CommandOutcome> {
        let mut ctx = Conversion::new(self.evaluator.as_ref(), &mut self.windows, at);
        self.session.exchange(descriptor, &mut ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SessionSettings;
    use mid_core::ErrorCode;
    use mid_protocol::{ChannelConfig, SafeFormulaEvaluator, UnitCommand, UnitConfig};
    use mid_transport::MemoryTransport;

    fn tach_descriptor() -> CommandDescriptor {
        CommandDescriptor::new(
            UnitCommand::Tach,
            5,
            vec![UnitConfig::new(30).channel(ChannelConfig::new(70).smoothed())],
        )
    }

    #[tokio::test]
    async fn test_link_keeps_smoothing_between_commands() {
        let transport = MemoryTransport::new()
            .reply(vec![1, 3, 3, 1, 100, 0])
            .reply(vec![1, 3, 3, 1, 200, 0]);
        let mut session = HubSession::new(transport, SessionSettings::udp());
        session.open().await.unwrap();
        let mut link = HubLink::new(session, Box::new(SafeFormulaEvaluator::new()));

        let descriptor = tach_descriptor();
        let first = link.exchange(&descriptor, Utc::now()).await.unwrap();
        assert_eq!(first.readings[0].value, Some(100.0));
        let second = link.exchange(&descriptor, Utc::now()).await.unwrap();
        assert_eq!(second.readings[0].value, Some(150.0));
        assert_eq!(second.readings[0].raw, Some(200.0));
        assert_eq!(link.windows().len(70), 2);
    }

    #[test]
    fn test_failure_records() {
        let descriptor = tach_descriptor();
        let timeout = failure_records(&descriptor, &MidError::Timeout);
        assert_eq!(timeout.count_of(ErrorCode::TIMEOUT), 1);

        let unparsable = failure_records(&descriptor, &MidError::UnparsableReply("x".into()));
        assert_eq!(unparsable.count_of(ErrorCode::PARSE), 1);
    }
}

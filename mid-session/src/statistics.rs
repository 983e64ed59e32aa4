//! Session statistics collection

/// Counters kept by a hub session
///
/// Updated by the session as commands go out and replies come back; callers
/// may read them at any time to judge link health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatistics {
    /// Commands written to the transport
    pub commands_sent: u64,
    /// Non-empty replies read back
    pub replies_received: u64,
    /// Commands the hub did not answer in time
    pub timeouts: u64,
    /// Reply packets rejected by framing checks
    pub framing_errors: u64,
    /// Input buffer flushes after a failed exchange
    pub resyncs: u64,
}

impl SessionStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset every counter to zero
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn increment_commands_sent(&mut self) {
        self.commands_sent += 1;
    }

    pub fn increment_replies_received(&mut self) {
        self.replies_received += 1;
    }

    pub fn increment_timeouts(&mut self) {
        self.timeouts += 1;
    }

    pub fn add_framing_errors(&mut self, count: u64) {
        self.framing_errors += count;
    }

    pub fn increment_resyncs(&mut self) {
        self.resyncs += 1;
    }

    /// Share of sent commands that got no reply, as a percentage
    ///
    /// Returns 0.0 before the first command.
    pub fn unanswered_rate(&self) -> f64 {
        if self.commands_sent == 0 {
            0.0
        } else {
            let unanswered = self.commands_sent.saturating_sub(self.replies_received);
            unanswered as f64 / self.commands_sent as f64 * 100.0
        }
    }
}

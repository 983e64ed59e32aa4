//! Session settings

use std::time::Duration;

/// Reply timeout granted per addressed unit
pub const DEFAULT_REPLY_TIMEOUT_PER_ADDRESS: Duration = Duration::from_secs(10);

/// Largest reply read from a datagram link
pub const MAX_DATAGRAM_SIZE: usize = 512;

/// How the end of a reply is found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFraming {
    /// Serial link: a u16 LE total length, counting its own two bytes, then
    /// the reply packets
    LengthPrefixed,
    /// UDP link: one datagram holds the whole reply
    Datagram,
}

/// Hub session settings
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub reply_timeout_per_address: Duration,
    pub max_datagram_size: usize,
    pub framing: ReplyFraming,
    /// Discard pending input before every command, not only after failures
    pub clear_before_send: bool,
}

impl SessionSettings {
    /// Settings for a hub on a serial line
    pub fn serial() -> Self {
        Self {
            reply_timeout_per_address: DEFAULT_REPLY_TIMEOUT_PER_ADDRESS,
            max_datagram_size: MAX_DATAGRAM_SIZE,
            framing: ReplyFraming::LengthPrefixed,
            clear_before_send: true,
        }
    }

    /// Settings for a hub reached over UDP
    pub fn udp() -> Self {
        Self {
            framing: ReplyFraming::Datagram,
            clear_before_send: false,
            ..Self::serial()
        }
    }

    pub fn with_reply_timeout_per_address(mut self, timeout: Duration) -> Self {
        self.reply_timeout_per_address = timeout;
        self
    }

    /// Time allowed for the reply to a command addressing `address_count` units
    pub fn reply_timeout(&self, address_count: usize) -> Duration {
        self.reply_timeout_per_address * address_count.max(1) as u32
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::serial()
    }
}

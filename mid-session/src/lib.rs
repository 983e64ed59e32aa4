//! Session layer for the MID sensor hub
//!
//! This crate drives a transport: it writes one encoded command at a time,
//! reads the reply back with the framing of the link, and keeps the input
//! buffer in sync after failures.

pub mod error;
pub mod link;
pub mod session;
pub mod settings;
pub mod statistics;

pub use error::{MidError, MidResult};
pub use link::{failure_records, CommandExchange, HubLink};
pub use session::{pong_matches, HubSession};
pub use settings::{
    ReplyFraming, SessionSettings, DEFAULT_REPLY_TIMEOUT_PER_ADDRESS, MAX_DATAGRAM_SIZE,
};
pub use statistics::SessionStatistics;

//! MID - middleware for the MID sensor hub
//!
//! Polls field sensor units through the hub over a serial line or UDP,
//! decodes their replies into engineering readings and collects per-sensor
//! error records for the upload layer.
//!
//! # Architecture
//!
//! - `mid-core`: error type, error codes, error aggregation, readings
//! - `mid-transport`: serial, UDP and in-memory transports
//! - `mid-protocol`: frames, reply decoding, payload codecs, conversion
//! - `mid-session`: one command at a time over a transport, with resync
//! - `mid-client`: configuration, cycle planning, multi-point cables, cycles
//!
//! # Usage
//!
//! ```no_run
//! use mid::client::HubClientBuilder;
//!
//! # async fn run(config_json: &str) -> mid::MidResult<()> {
//! let mut client = HubClientBuilder::new().udp("0.0.0.0:0", "192.168.1.50:2101").build()?;
//! client.open().await?;
//! client.configure_json(config_json)?;
//! loop {
//!     let report = client.run_paced_cycle().await;
//!     for reading in &report.readings {
//!         println!("{} {:?}", reading.sensor_id, reading.value);
//!     }
//! }
//! # }
//! ```

pub use mid_core::{
    ErrorCode, ErrorRecord, ErrorResponse, ErrorTarget, MidError, MidResult, Reading, ReadingType,
    SensorId,
};

pub mod transport {
    pub use mid_transport::*;
}

pub mod protocol {
    pub use mid_protocol::*;
}

pub mod session {
    pub use mid_session::*;
}

pub mod client {
    pub use mid_client::*;
}

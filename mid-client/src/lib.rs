//! Reading cycles for the MID sensor hub
//!
//! The server configuration (`commandInfo` records) is planned into hub
//! commands once; each cycle then runs the plan over a hub link and returns
//! the readings plus the error records of everything that failed.
//!
//! - `config`: server configuration records
//! - `plan`: grouping records into commands and orchestrated steps
//! - `pressure`: sampled and averaged wide pressure readings
//! - `multipoint`: reset / enumerate / read sequences of multi-point cables
//! - `cycle`: running a plan and pacing cycles
//! - `client`, `builder`: the assembled client

pub mod builder;
pub mod client;
pub mod config;
pub mod cycle;
pub mod error;
pub mod multipoint;
pub mod plan;
pub mod pressure;

pub use builder::HubClientBuilder;
pub use client::HubClient;
pub use config::{
    parse_bus_address, HubConfig, MultiPointExtra, MultiPointRecord, SensorRecord, SingleRecord,
    TempHumRecord, ThermocoupleRecord,
};
pub use cycle::{run_cycle, CyclePacer, CycleReport, DEFAULT_MIN_CYCLE_INTERVAL};
pub use error::{MidError, MidResult};
pub use multipoint::{
    MultiPointAddressing, MultiPointPhase, MultiPointSession, MAX_POINTS, MAX_VALID_FAHRENHEIT,
};
pub use plan::{CyclePlan, PlanStep};
pub use pressure::{PressureAverage, PRESSURE_SAMPLES_PER_READING};

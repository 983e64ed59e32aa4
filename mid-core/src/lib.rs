//! Core types and utilities for the MID sensor hub protocol
//!
//! This crate provides the error type, error codes, the cycle-wide error
//! aggregator and the reading model used throughout the MID implementation.

pub mod error;
pub mod error_code;
pub mod error_response;
pub mod reading;

pub use error::{MidError, MidResult};
pub use error_code::{ErrorCode, ErrorRecord, ErrorTarget};
pub use error_response::ErrorResponse;
pub use reading::{Reading, ReadingType, SensorId};

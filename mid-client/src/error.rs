//! Error types for the client layer

pub use mid_core::error::{MidError, MidResult};

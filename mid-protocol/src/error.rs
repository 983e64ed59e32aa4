//! Error types for the protocol layer

pub use mid_core::error::{MidError, MidResult};

//! Error types for the transport layer

pub use mid_core::error::{MidError, MidResult};

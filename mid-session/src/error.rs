//! Error types for the session layer

pub use mid_core::error::{MidError, MidResult};

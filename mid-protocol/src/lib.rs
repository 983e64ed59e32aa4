//! Wire protocol for the MID sensor hub
//!
//! This crate is pure: it builds request frames, decodes reply buffers and
//! turns raw unit payloads into readings. It never touches a transport.
//!
//! - [x] General, direct, calibration, ping and hub version frames
//! - [x] Readings / pong / error list / hub version replies
//! - [x] Payload codecs for every unit command
//! - [x] Sandboxed conversion formulas with per-sensor smoothing
//! - [x] Mixed error list + readings reply streams
//! - [ ] CRC check of unit payloads (the hub strips it before forwarding)

pub mod codec;
pub mod conversion;
pub mod descriptor;
pub mod error;
pub mod frame;
pub mod matcher;
pub mod reply;

pub use codec::{codec_for, ChannelResult, ConversionFailure, PayloadCodec, RawUnit, EMPTY_SLOT};
pub use conversion::{
    Conversion, FormulaEvaluator, SafeFormulaEvaluator, SmoothingWindows, SMOOTHING_WINDOW,
};
pub use descriptor::{ChannelConfig, CommandDescriptor, UnitConfig};
pub use error::{MidError, MidResult};
pub use frame::{RequestFrame, UnitCommand, MAX_ADDRESSES, PORT_COUNT};
pub use matcher::{read_calibration_reply, CalibrationReply, CommandOutcome, ReplyMatcher};
pub use reply::{decode_header, version_from_raw, ReplyKind, ReplyReader};

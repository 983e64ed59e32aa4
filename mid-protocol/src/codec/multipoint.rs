//! Multi-point temperature probe commands
//!
//! None of these produce readings on their own. The raw fields are collected
//! by the multi-point orchestrator, which pairs enumerated bus addresses with
//! the temperatures read from the same slot.

use super::PayloadCodec;

/// Bus address reported for a slot with no device
pub const EMPTY_SLOT: u64 = 0xFFFF_FFFF_FFFF_FFFF;

/// Convert a DS18B20 scratchpad temperature word to °F
///
/// The word is 12-bit two's complement fixed point with four fractional bits.
pub fn ds18b20_fahrenheit(raw: u16) -> f64 {
    let negative = raw & 0xF800 != 0;
    let magnitude = if negative { raw.wrapping_neg() } else { raw };
    let whole = f64::from((magnitude & 0x07F0) >> 4);
    let fraction = f64::from(magnitude & 0x000F) / 16.0;
    let celsius = if negative {
        -(whole + fraction)
    } else {
        whole + fraction
    };
    1.8 * celsius + 32.0
}

/// Reset acknowledgement, one byte per unit
#[derive(Debug, Clone, Copy)]
pub struct MultiPointResetCodec;

impl PayloadCodec for MultiPointResetCodec {
    fn field_widths(&self) -> &'static [usize] {
        &[1]
    }
}

/// Temperature word of one bus slot
#[derive(Debug, Clone, Copy)]
pub struct MultiPointReadCodec;

impl PayloadCodec for MultiPointReadCodec {
    fn field_widths(&self) -> &'static [usize] {
        &[2]
    }
}

/// 64-bit bus address of one slot, [`EMPTY_SLOT`] when unused
#[derive(Debug, Clone, Copy)]
pub struct MultiPointAddressCodec;

impl PayloadCodec for MultiPointAddressCodec {
    fn field_widths(&self) -> &'static [usize] {
        &[8]
    }
}

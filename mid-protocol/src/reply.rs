//! Reply packets sent from the hub to the MID
//!
//! A reply buffer holds one or more packets back to back. Each packet starts
//! with a one byte kind:
//!
//! ```text
//! 1  readings    S CC N [payload]*     S = payloadSize * N + 1
//! 3  pong        value(u16 LE)
//! 4  error list  count [code addrIdx]*
//! 5  hub version value(u16 LE)
//! ```

use crate::error::{MidError, MidResult};
use crate::frame::sign_extend;
use mid_core::ErrorCode;

/// Kind byte of a reply packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Readings,
    Pong,
    ErrorList,
    HubVersion,
}

impl ReplyKind {
    pub fn code(&self) -> u8 {
        match self {
            ReplyKind::Readings => 1,
            ReplyKind::Pong => 3,
            ReplyKind::ErrorList => 4,
            ReplyKind::HubVersion => 5,
        }
    }

    /// Parse a reply kind byte
    pub fn from_code(code: u8) -> MidResult<Self> {
        match code {
            1 => Ok(ReplyKind::Readings),
            3 => Ok(ReplyKind::Pong),
            4 => Ok(ReplyKind::ErrorList),
            5 => Ok(ReplyKind::HubVersion),
            other => Err(MidError::UnknownReplyKind(other)),
        }
    }
}

/// Split off the leading kind byte of a reply
pub fn decode_header(data: &[u8]) -> MidResult<(ReplyKind, &[u8])> {
    let (&first, rest) = data.split_first().ok_or(MidError::EmptyReply)?;
    Ok((ReplyKind::from_code(first)?, rest))
}

/// Convert a raw firmware version word to its dotted value
pub fn version_from_raw(raw: u16) -> f64 {
    3.0 + raw as f64 / 100.0
}

/// Cursor over a reply buffer
#[derive(Debug)]
pub struct ReplyReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> ReplyReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Move to an absolute position, clamped to the end of the buffer
    pub fn seek(&mut self, position: usize) {
        self.position = position.min(self.buffer.len());
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.buffer.get(self.position).copied()
    }

    pub fn read_u8(&mut self) -> MidResult<u8> {
        let bytes = self.read_bytes(1)?;
        Ok(bytes[0])
    }

    pub fn read_u16_le(&mut self) -> MidResult<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read an unsigned little-endian field of 1, 2, 4 or 8 bytes
    pub fn read_uint_le(&mut self, width: usize) -> MidResult<u64> {
        if width == 0 || width > 8 {
            return Err(MidError::ReplyParse(format!("Invalid field width {}", width)));
        }
        let bytes = self.read_bytes(width)?;
        let mut raw = [0u8; 8];
        raw[..width].copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    /// Read a signed little-endian field of 2, 4 or 8 bytes
    pub fn read_int_le(&mut self, width: usize) -> MidResult<i64> {
        if width == 0 || width > 8 {
            return Err(MidError::ReplyParse(format!("Invalid field width {}", width)));
        }
        let bytes = self.read_bytes(width)?;
        Ok(sign_extend(bytes))
    }

    pub fn read_bytes(&mut self, len: usize) -> MidResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(MidError::ReplyParse(format!(
                "Not enough bytes: need {}, have {}",
                len,
                self.remaining()
            )));
        }
        let bytes = &self.buffer[self.position..self.position + len];
        self.position += len;
        Ok(bytes)
    }

    /// Read the kind byte, leaving the cursor untouched unless it matches
    pub fn expect_kind(&mut self, kind: ReplyKind) -> MidResult<()> {
        let code = self.peek_u8().ok_or(MidError::EmptyReply)?;
        if code != kind.code() {
            return Err(match kind {
                ReplyKind::Readings => MidError::NotReadingsReply(code),
                ReplyKind::ErrorList => MidError::NotErrorReply(code),
                _ => match ReplyKind::from_code(code) {
                    Ok(other) => MidError::ReplyParse(format!(
                        "Expected {:?} reply, got {:?}",
                        kind, other
                    )),
                    Err(e) => e,
                },
            });
        }
        self.position += 1;
        Ok(())
    }
}

/// Header of a readings packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadingsHeader {
    /// Offset of the kind byte in the reply buffer
    pub start: usize,
    /// Declared data size `S`
    pub data_size: u8,
    /// Echoed command code
    pub command_code: u8,
    /// Number of units in the packet
    pub address_count: u8,
}

impl ReadingsHeader {
    /// Read a readings header
    ///
    /// Fails with [`MidError::NotReadingsReply`] without consuming anything
    /// when the next packet is of another kind.
    pub fn read(reader: &mut ReplyReader<'_>) -> MidResult<Self> {
        let start = reader.position();
        reader.expect_kind(ReplyKind::Readings)?;
        let data_size = reader.read_u8()?;
        let command_code = reader.read_u8()?;
        let address_count = reader.read_u8()?;
        Ok(Self {
            start,
            data_size,
            command_code,
            address_count,
        })
    }

    /// Total packet length, kind byte included
    pub fn packet_len(&self) -> usize {
        self.data_size as usize + 3
    }

    /// Offset just past this packet
    pub fn end(&self) -> usize {
        self.start + self.packet_len()
    }

    /// Validate the header against what was sent
    pub fn check(&self, sent_code: u8, sent_count: usize, unit_size: usize) -> MidResult<()> {
        if self.command_code != sent_code {
            return Err(MidError::ReplyCommandMismatch {
                sent: sent_code,
                received: self.command_code,
            });
        }
        if self.address_count as usize != sent_count {
            return Err(MidError::ReplyAddressCountMismatch {
                sent: sent_count,
                received: self.address_count as usize,
            });
        }
        let expected = unit_size * sent_count + 1;
        if self.data_size as usize != expected {
            return Err(MidError::ReplySize {
                expected,
                declared: self.data_size as usize,
            });
        }
        Ok(())
    }
}

/// Read an error list packet into `(code, 1-based address index)` pairs
///
/// Fails with [`MidError::NotErrorReply`] without consuming anything when the
/// next packet is of another kind.
pub fn read_error_list(reader: &mut ReplyReader<'_>) -> MidResult<Vec<(ErrorCode, u8)>> {
    let start = reader.position();
    reader.expect_kind(ReplyKind::ErrorList)?;
    let parsed = read_fault_pairs(reader);
    if parsed.is_err() {
        reader.seek(start);
    }
    parsed
}

fn read_fault_pairs(reader: &mut ReplyReader<'_>) -> MidResult<Vec<(ErrorCode, u8)>> {
    let count = reader.read_u8()?;
    let mut faults = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let code = reader.read_u8()?;
        let index = reader.read_u8()?;
        faults.push((ErrorCode(code), index));
    }
    Ok(faults)
}

/// Read a pong packet
pub fn read_pong(reader: &mut ReplyReader<'_>) -> MidResult<u16> {
    reader.expect_kind(ReplyKind::Pong)?;
    reader.read_u16_le()
}

/// Read a hub version packet, returning the raw version word
pub fn read_hub_version(reader: &mut ReplyReader<'_>) -> MidResult<u16> {
    reader.expect_kind(ReplyKind::HubVersion)?;
    reader.read_u16_le()
}

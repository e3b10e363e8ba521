//! # Protobuf Wire Primitives
//!
//! The subset of the protobuf wire format needed by the ledger: unsigned
//! LEB128 varints, length-delimited byte strings and field keys.
//!
//! ## Varint layout
//!
//! Seven payload bits per byte, least significant group first. The high bit of
//! each byte is set when more bytes follow. A `u64` takes at most 10 bytes.

use crate::errors::WireError;

/// Longest possible encoding of a `u64` varint.
pub const MAX_VARINT_LEN: usize = 10;

/// Wire type tags from the protobuf encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    Fixed32 = 5,
}

impl WireType {
    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::LengthDelimited),
            5 => Some(WireType::Fixed32),
            _ => None,
        }
    }
}

// =============================================================================
// WRITING
// =============================================================================

/// Append `value` as an unsigned varint.
#[inline]
pub fn put_uvarint(buf: &mut Vec<u8>, value: u64) {
    let mut val = value;
    while val >= 0x80 {
        buf.push((val as u8 & 0x7F) | 0x80);
        val >>= 7;
    }
    buf.push(val as u8);
}

/// Number of bytes `put_uvarint` emits for `value`.
#[inline]
pub fn uvarint_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Append a varint length prefix followed by `bytes`.
#[inline]
pub fn put_raw_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    put_uvarint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Append a field key (`field << 3 | wire_type`).
#[inline]
pub fn put_field_key(buf: &mut Vec<u8>, field: u32, wire_type: WireType) {
    put_uvarint(buf, (u64::from(field) << 3) | wire_type as u64);
}

/// Append a varint field. Zero values are omitted, as proto3 does.
pub fn put_varint_field(buf: &mut Vec<u8>, field: u32, value: u64) {
    if value != 0 {
        put_field_key(buf, field, WireType::Varint);
        put_uvarint(buf, value);
    }
}

/// Append a length-delimited field. Empty values are omitted.
pub fn put_bytes_field(buf: &mut Vec<u8>, field: u32, bytes: &[u8]) {
    if !bytes.is_empty() {
        put_field_key(buf, field, WireType::LengthDelimited);
        put_raw_bytes(buf, bytes);
    }
}

// =============================================================================
// READING
// =============================================================================

/// Zero-copy cursor over wire-encoded bytes.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Offset of the next unread byte.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Read an unsigned varint.
    pub fn read_uvarint(&mut self) -> Result<u64, WireError> {
        let start = self.pos;
        let mut result: u64 = 0;
        let mut shift: u32 = 0;

        loop {
            let Some(&byte) = self.buf.get(self.pos) else {
                return Err(WireError::Truncated {
                    context: "varint",
                    offset: start,
                });
            };
            self.pos += 1;

            // The tenth byte may only contribute the single top bit.
            if shift == 63 && byte > 1 {
                return Err(WireError::VarintOverflow { offset: start });
            }
            result |= u64::from(byte & 0x7F) << shift;

            if byte & 0x80 == 0 {
                return Ok(result);
            }

            shift += 7;
            if shift > 63 {
                return Err(WireError::VarintOverflow { offset: start });
            }
        }
    }

    /// Read a varint length prefix and return the slice it frames.
    pub fn read_raw_bytes(&mut self) -> Result<&'a [u8], WireError> {
        let start = self.pos;
        let len = self.read_uvarint()?;
        let len = usize::try_from(len).map_err(|_| WireError::LengthOverflow {
            length: len,
            offset: start,
        })?;
        self.take(len, "length-delimited bytes")
    }

    /// Take the next `len` bytes verbatim.
    pub fn take(&mut self, len: usize, context: &'static str) -> Result<&'a [u8], WireError> {
        if self.remaining() < len {
            return Err(WireError::Truncated {
                context,
                offset: self.pos,
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Read a field key, returning `(field_number, wire_type)`.
    pub fn read_field_key(&mut self) -> Result<(u32, WireType), WireError> {
        let start = self.pos;
        let key = self.read_uvarint()?;
        let field = (key >> 3) as u32;
        let tag = (key & 0x07) as u8;
        if field == 0 {
            return Err(WireError::InvalidFieldNumber { offset: start });
        }
        let wire_type = WireType::from_tag(tag).ok_or(WireError::UnsupportedWireType {
            field,
            wire_type: tag,
            offset: start,
        })?;
        Ok((field, wire_type))
    }

    /// Skip the value of a field whose key has already been read.
    pub fn skip_field(&mut self, wire_type: WireType) -> Result<(), WireError> {
        match wire_type {
            WireType::Varint => self.read_uvarint().map(|_| ()),
            WireType::Fixed64 => self.take(8, "fixed64").map(|_| ()),
            WireType::LengthDelimited => self.read_raw_bytes().map(|_| ()),
            WireType::Fixed32 => self.take(4, "fixed32").map(|_| ()),
        }
    }
}

/// Check that a known field arrived with the expected wire type.
pub fn expect_wire_type(
    message: &'static str,
    field: u32,
    expected: WireType,
    actual: WireType,
) -> Result<(), WireError> {
    if expected == actual {
        Ok(())
    } else {
        Err(WireError::WrongWireType {
            message,
            field,
            expected: expected as u8,
            actual: actual as u8,
        })
    }
}

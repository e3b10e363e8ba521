//! # Error Types
//!
//! Errors raised while decoding protobuf wire data.

use thiserror::Error;

/// Errors that can occur while reading wire-encoded bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Input ended before a complete value could be read.
    #[error("truncated input while reading {context} at offset {offset}")]
    Truncated { context: &'static str, offset: usize },

    /// A varint ran past 10 bytes or overflowed 64 bits.
    #[error("varint overflow at offset {offset}")]
    VarintOverflow { offset: usize },

    /// The field key carried a wire type this decoder does not handle.
    #[error("unsupported wire type {wire_type} for field {field} at offset {offset}")]
    UnsupportedWireType {
        field: u32,
        wire_type: u8,
        offset: usize,
    },

    /// A known field was encoded with the wrong wire type.
    #[error("field {field} of {message} has wire type {actual}, expected {expected}")]
    WrongWireType {
        message: &'static str,
        field: u32,
        expected: u8,
        actual: u8,
    },

    /// Field number zero is reserved.
    #[error("invalid field number 0 at offset {offset}")]
    InvalidFieldNumber { offset: usize },

    /// A length prefix does not fit in memory on this platform.
    #[error("length {length} at offset {offset} exceeds addressable size")]
    LengthOverflow { length: u64, offset: usize },

    /// A string field held invalid UTF-8.
    #[error("field {field} of {message} is not valid UTF-8")]
    InvalidUtf8 { message: &'static str, field: u32 },

    /// A required nested message was absent.
    #[error("{message} is missing required field {field}")]
    MissingField { message: &'static str, field: &'static str },
}

//! # Ledger Types Crate
//!
//! Data types shared by every crate that touches ledger blocks.
//!
//! ## Contents
//!
//! - `entities` - `Block`, `BlockHeader`, `BlockData`, `BlockMetadata`,
//!   `TxValidationCode`
//! - `envelope` - the transaction envelope message family
//!   (`Envelope` → `Payload` → `Header` → `ChannelHeader`)
//! - `wire` - protobuf wire primitives (LEB128 varints, length-delimited fields)
//! - `errors` - `WireError`
//!
//! Blocks are opaque to this crate beyond their header and metadata: the
//! envelope bytes inside `BlockData` are carried verbatim, so re-encoding a
//! decoded block never changes its hash.

pub mod entities;
pub mod envelope;
pub mod errors;
pub mod wire;

pub use entities::*;
pub use envelope::{tx_id_from_envelope, ChannelHeader, Envelope, Header, HeaderType, Payload, Timestamp};
pub use errors::WireError;

//! # Ports Layer
//!
//! Defines the port traits for the block storage subsystem.
//!
//! ## Hexagonal Architecture
//!
//! - `inbound.rs` - Driving port (the per-ledger block store API)
//! - `outbound.rs` - Driven port (the ordered key-value engine behind the index)

pub mod inbound;
pub mod outbound;

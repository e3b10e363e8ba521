//! # Domain Layer
//!
//! Pure logic of the block store: the on-disk block encoding, the values the
//! index stores, key layout, configuration and errors. Nothing in here touches
//! the filesystem or the index engine.

pub mod codec;
pub mod config;
pub mod entities;
pub mod errors;
pub mod keys;

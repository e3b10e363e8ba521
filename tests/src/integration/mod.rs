//! # Integration Scenarios
//!
//! End-to-end tests through `BlockStoreProvider`, on real temporary
//! directories.
//!
//! - `block_store`: write and read paths of one ledger
//! - `recovery`: reopening after crashes, lost indexes and damaged files
//! - `provider`: ledger lifecycle, locking and the shared index

pub mod block_store;
pub mod provider;
pub mod recovery;

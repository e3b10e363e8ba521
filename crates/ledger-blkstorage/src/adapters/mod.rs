//! # Adapters Module
//!
//! Concrete implementations behind the ports.
//!
//! ## Modules
//!
//! - `storage`: `KeyValueStore` engines for the index
//! - `shared_index`: the ref-counted index handle shared by every ledger
//! - `lock`: process lock on the storage root

pub mod lock;
pub mod shared_index;
pub mod storage;

pub use lock::DatabaseLock;
pub use shared_index::{IndexDbHandle, SharedIndexDb};

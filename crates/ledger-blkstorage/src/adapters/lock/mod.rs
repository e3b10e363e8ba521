//! # Storage Root Locking
//!
//! Prevents two providers, in this or another process, from opening the same
//! storage root.
//!
//! ## Modules
//!
//! - `flock`: `DatabaseLock` implementation using fs2

mod flock;

pub use flock::DatabaseLock;

//! # Ledger Storage Benchmarks
//!
//! Criterion benchmarks, registered from `benches/blkstorage_benchmarks.rs`.

pub mod block_storage;

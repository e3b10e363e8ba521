//! # Ledger Storage Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Chain builders and provider setup
//! ├── benchmarks/       # Criterion benchmarks (run via benches/)
//! └── integration/      # End-to-end scenarios through the provider
//!     ├── block_store.rs
//!     ├── provider.rs
//!     └── recovery.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p ledger-tests
//!
//! # With storage logs
//! RUST_LOG=ledger_blkstorage=debug cargo test -p ledger-tests -- --nocapture
//!
//! # Benchmarks
//! cargo bench -p ledger-tests
//! ```

pub mod benchmarks;
pub mod fixtures;
pub mod integration;

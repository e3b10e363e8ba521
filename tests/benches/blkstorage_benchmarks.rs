//! # Block Storage Benchmarks
//!
//! ```bash
//! cargo bench -p ledger-tests
//! cargo bench -p ledger-tests -- blkstorage/write
//! ```

use criterion::{criterion_group, criterion_main, Criterion};
use ledger_tests::benchmarks::block_storage;

fn bench_block_storage(c: &mut Criterion) {
    block_storage::register_benchmarks(c);
}

criterion_group!(benches, bench_block_storage);
criterion_main!(benches);

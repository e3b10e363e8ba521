//! # Block Storage Benchmarks
//!
//! Write throughput for the durability modes callers choose between:
//!
//! | Mode | Storage barrier |
//! |------|-----------------|
//! | `sync` | every block |
//! | `no_sync/flush_every_N` | every N blocks (`flush_interval_blocks = N`) |
//! | `no_sync/manual` | once, after the whole batch |
//!
//! Read benchmarks cover the three index lookups plus the codec.

use std::time::Duration;

use criterion::{black_box, BatchSize, BenchmarkId, Criterion, Throughput};
use ledger_blkstorage::{
    deserialize_block, extract_block_info, serialize_block, BlockStoreApi, BlockStoreConfig,
    BlockStoreProvider,
};
use ledger_types::Block;
use rand::Rng;
use tempfile::TempDir;

use crate::fixtures::{provider_with, random_chain, tx_id, LEDGER};

const BLOCKS_PER_ITER: u64 = 50;
const TXS_PER_BLOCK: usize = 10;

fn fresh_provider(flush_interval: u64) -> (TempDir, BlockStoreProvider) {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = provider_with(
        BlockStoreConfig::new(dir.path()).with_flush_interval(flush_interval),
    );
    (dir, provider)
}

fn chain() -> Vec<Block> {
    random_chain(42, BLOCKS_PER_ITER, TXS_PER_BLOCK)
}

pub fn bench_write_modes(c: &mut Criterion) {
    let mut group = c.benchmark_group("blkstorage/write");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(20);
    group.throughput(Throughput::Elements(BLOCKS_PER_ITER));
    let chain = chain();

    group.bench_function("sync", |b| {
        b.iter_batched(
            || fresh_provider(0),
            |(_dir, provider)| {
                let store = provider.open(LEDGER).expect("open");
                for block in &chain {
                    store.add_block(block).expect("add");
                }
            },
            BatchSize::PerIteration,
        )
    });

    for interval in [1u64, 10, 25] {
        group.bench_with_input(
            BenchmarkId::new("no_sync/flush_every", interval),
            &interval,
            |b, &interval| {
                b.iter_batched(
                    || fresh_provider(interval),
                    |(_dir, provider)| {
                        let store = provider.open(LEDGER).expect("open");
                        for block in &chain {
                            store.add_block_no_sync(block).expect("add");
                        }
                        store.flush().expect("flush");
                    },
                    BatchSize::PerIteration,
                )
            },
        );
    }

    group.bench_function("no_sync/manual", |b| {
        b.iter_batched(
            || fresh_provider(0),
            |(_dir, provider)| {
                let store = provider.open(LEDGER).expect("open");
                for block in &chain {
                    store.add_block_no_sync(block).expect("add");
                }
                store.flush().expect("flush");
            },
            BatchSize::PerIteration,
        )
    });

    group.finish();
}

pub fn bench_lookups(c: &mut Criterion) {
    let mut group = c.benchmark_group("blkstorage/read");
    let (_dir, provider) = fresh_provider(0);
    let store = provider.open(LEDGER).expect("open");
    let chain = chain();
    for block in &chain {
        store.add_block_no_sync(block).expect("add");
    }
    store.flush().expect("flush");
    let hashes: Vec<Vec<u8>> = chain.iter().map(Block::hash).collect();
    let mut rng = rand::thread_rng();

    group.bench_function("by_number", |b| {
        b.iter(|| {
            let n = rng.gen_range(0..BLOCKS_PER_ITER);
            black_box(store.retrieve_block_by_number(n).expect("read"))
        })
    });

    group.bench_function("by_hash", |b| {
        b.iter(|| {
            let hash = &hashes[rng.gen_range(0..hashes.len())];
            black_box(store.retrieve_block_by_hash(hash).expect("read"))
        })
    });

    // ids of malformed envelopes are absent; both outcomes are lookups
    group.bench_function("tx_by_id", |b| {
        b.iter(|| {
            let id = tx_id(rng.gen_range(0..BLOCKS_PER_ITER), 0);
            black_box(store.retrieve_tx_by_id(&id).ok())
        })
    });

    group.finish();
}

pub fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("blkstorage/codec");
    for txs in [1usize, 10, 100] {
        let block = random_chain(7, 1, txs).remove(0);
        let (bytes, _) = serialize_block(&block);
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("serialize", txs), &block, |b, block| {
            b.iter(|| black_box(serialize_block(block)))
        });
        group.bench_with_input(BenchmarkId::new("deserialize", txs), &bytes, |b, bytes| {
            b.iter(|| black_box(deserialize_block(bytes).expect("decode")))
        });
        group.bench_with_input(BenchmarkId::new("extract_info", txs), &bytes, |b, bytes| {
            b.iter(|| black_box(extract_block_info(bytes).expect("decode")))
        });
    }
    group.finish();
}

pub fn register_benchmarks(c: &mut Criterion) {
    bench_write_modes(c);
    bench_lookups(c);
    bench_codec(c);
}

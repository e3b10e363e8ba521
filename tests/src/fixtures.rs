//! # Test Fixtures
//!
//! Chain builders shared by the integration tests and the benchmarks.

use std::path::Path;

use ledger_blkstorage::{BlockStoreConfig, BlockStoreProvider, IndexEngine};
use ledger_types::{Block, Envelope};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Ledger id used by single-ledger scenarios.
pub const LEDGER: &str = "testledger";

/// Deterministic transaction id of transaction `tx` in block `block`.
pub fn tx_id(block: u64, tx: usize) -> String {
    format!("tx-{block:06}-{tx:03}")
}

/// Envelope bytes carrying `tx_id` and `payload`.
pub fn envelope(tx_id: &str, payload: Vec<u8>) -> Vec<u8> {
    Envelope::for_transaction(LEDGER, tx_id, payload).encode_to_vec()
}

/// `count` chained blocks with `txs` transactions each.
pub fn make_chain(count: u64, txs: usize) -> Vec<Block> {
    let mut previous = Vec::new();
    (0..count)
        .map(|n| {
            let envelopes = (0..txs)
                .map(|i| envelope(&tx_id(n, i), format!("payload {n}/{i}").into_bytes()))
                .collect();
            let block = Block::new(n, previous.clone(), envelopes);
            previous = block.hash();
            block
        })
        .collect()
}

/// Chain with random payload sizes and transaction counts.
///
/// Roughly one transaction in ten is not a decodable envelope and therefore
/// has no id.
pub fn random_chain(seed: u64, count: u64, max_txs: usize) -> Vec<Block> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut previous = Vec::new();
    (0..count)
        .map(|n| {
            let txs = rng.gen_range(1..=max_txs);
            let envelopes = (0..txs)
                .map(|i| {
                    let len = rng.gen_range(0..512);
                    let payload: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
                    if rng.gen_ratio(1, 10) {
                        // a bare length-delimited field 15 with no content
                        let mut bytes = vec![0x7a, 0xff];
                        bytes.extend_from_slice(&payload);
                        bytes
                    } else {
                        envelope(&tx_id(n, i), payload)
                    }
                })
                .collect();
            let block = Block::new(n, previous.clone(), envelopes);
            previous = block.hash();
            block
        })
        .collect()
}

/// Provider over `root` with the file index engine.
pub fn provider(root: &Path) -> BlockStoreProvider {
    provider_with(BlockStoreConfig::new(root))
}

/// Provider over `root` whose index lives only in memory.
pub fn memory_provider(root: &Path) -> BlockStoreProvider {
    provider_with(BlockStoreConfig::new(root).with_index_engine(IndexEngine::Memory))
}

pub fn provider_with(config: BlockStoreConfig) -> BlockStoreProvider {
    init_tracing();
    let span = tracing::info_span!("node", root = %config.root().display());
    BlockStoreProvider::with_span(config, span).expect("open provider")
}

/// Route storage logs to the test output, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

//! # Block Store Scenarios
//!
//! Sequencing, index/file agreement, sync/no-sync equivalence and corruption
//! reporting, exercised through a provider-opened ledger.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;

    use ledger_blkstorage::{BlockStoreApi, KeyPrefix, StorageError};
    use ledger_types::{tx_id_from_envelope, Block, TxValidationCode};

    use crate::fixtures::{envelope, make_chain, memory_provider, provider, random_chain, tx_id, LEDGER};

    // =========================================================================
    // SEQUENCING
    // =========================================================================

    #[test]
    fn test_fresh_ledger_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(dir.path());
        let store = provider.open(LEDGER).unwrap();

        let mut chain = make_chain(5, 2);
        chain[2].set_validation_codes(&[TxValidationCode::VALID, TxValidationCode::MVCC_READ_CONFLICT]);
        for block in &chain[..3] {
            store.add_block(block).unwrap();
        }

        assert_eq!(store.retrieve_block_by_number(1).unwrap(), chain[1]);
        assert_eq!(
            store
                .retrieve_tx_validation_code_by_tx_id(&tx_id(2, 1))
                .unwrap(),
            TxValidationCode::MVCC_READ_CONFLICT
        );

        let before = store.get_blockchain_info().unwrap();
        let err = store.add_block(&chain[4]).unwrap_err();
        assert!(matches!(
            err,
            StorageError::UnexpectedBlockNumber { expected: 3, got: 4 }
        ));
        assert_eq!(store.get_blockchain_info().unwrap(), before);
        assert!(matches!(
            store.retrieve_block_by_number(3),
            Err(StorageError::BlockNumberNotFound { number: 3 })
        ));
        assert!(!store.tx_id_exists(&tx_id(4, 0)).unwrap());

        store.add_block(&chain[3]).unwrap();
        assert_eq!(store.get_blockchain_info().unwrap().height, 4);
    }

    #[test]
    fn test_block_can_be_found_every_way() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(dir.path());
        let store = provider.open(LEDGER).unwrap();
        let chain = make_chain(4, 3);
        for block in &chain {
            store.add_block(block).unwrap();
        }

        for block in &chain {
            let n = block.number();
            assert_eq!(&store.retrieve_block_by_number(n).unwrap(), block);
            assert_eq!(&store.retrieve_block_by_hash(&block.hash()).unwrap(), block);
            assert_eq!(&store.retrieve_block_by_tx_id(&tx_id(n, 2)).unwrap(), block);
        }
        assert!(store.retrieve_block_by_hash(&[0u8; 32]).unwrap_err().is_not_found());
    }

    // =========================================================================
    // INDEX / FILE AGREEMENT
    // =========================================================================

    #[test]
    fn test_every_tx_reads_back_its_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(dir.path());
        let store = provider.open(LEDGER).unwrap();
        let chain = random_chain(7, 60, 8);
        for block in &chain {
            store.add_block(block).unwrap();
        }

        let mut checked = 0;
        for block in &chain {
            for (i, bytes) in block.data.data.iter().enumerate() {
                assert_eq!(
                    &store
                        .retrieve_tx_by_block_num_tx_num(block.number(), i as u64)
                        .unwrap(),
                    bytes
                );
                let id = tx_id_from_envelope(bytes).unwrap_or_default();
                if id.is_empty() {
                    continue;
                }
                assert_eq!(&store.retrieve_tx_by_id(&id).unwrap(), bytes, "{id}");
                checked += 1;
            }
        }
        assert!(checked > 0);
    }

    #[test]
    fn test_duplicate_tx_id_resolves_to_first_occurrence() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(dir.path());
        let store = provider.open(LEDGER).unwrap();

        let genesis = Block::new(0, Vec::new(), vec![envelope("unique", b"a".to_vec())]);
        let mut first = Block::new(
            1,
            genesis.hash(),
            vec![envelope("other", b"b".to_vec()), envelope("dup", b"first".to_vec())],
        );
        first.set_validation_codes(&[TxValidationCode::VALID, TxValidationCode::VALID]);
        let mut second = Block::new(2, first.hash(), vec![envelope("dup", b"second".to_vec())]);
        second.set_validation_codes(&[TxValidationCode::DUPLICATE_TXID]);

        for block in [&genesis, &first, &second] {
            store.add_block(block).unwrap();
        }

        assert_eq!(store.retrieve_tx_by_id("dup").unwrap(), first.data.data[1]);
        assert_eq!(store.retrieve_block_by_tx_id("dup").unwrap(), first);
        assert_eq!(
            store.retrieve_tx_validation_code_by_tx_id("dup").unwrap(),
            TxValidationCode::VALID
        );
        // the later occurrence is still reachable by position
        assert_eq!(
            store.retrieve_tx_by_block_num_tx_num(2, 0).unwrap(),
            second.data.data[0]
        );
    }

    #[test]
    fn test_ledgers_do_not_share_entries() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(dir.path());
        let left = provider.open("left").unwrap();
        let right = provider.open("right").unwrap();

        let chain = make_chain(3, 1);
        for block in &chain {
            left.add_block(block).unwrap();
        }
        right.add_block(&chain[0]).unwrap();

        assert!(left.tx_id_exists(&tx_id(2, 0)).unwrap());
        assert!(!right.tx_id_exists(&tx_id(2, 0)).unwrap());
        assert_eq!(right.get_blockchain_info().unwrap().height, 1);
        assert!(right.retrieve_block_by_number(1).unwrap_err().is_not_found());
    }

    // =========================================================================
    // SYNC / NO-SYNC EQUIVALENCE
    // =========================================================================

    #[test]
    fn test_no_sync_then_flush_matches_sync() {
        let chain = random_chain(11, 40, 5);

        let sync_dir = tempfile::tempdir().unwrap();
        let sync_provider = provider(sync_dir.path());
        let synced = sync_provider.open(LEDGER).unwrap();
        for block in &chain {
            synced.add_block(block).unwrap();
        }

        let batch_dir = tempfile::tempdir().unwrap();
        let batch_provider = provider(batch_dir.path());
        let batched = batch_provider.open(LEDGER).unwrap();
        for block in &chain {
            batched.add_block_no_sync(block).unwrap();
        }
        batched.flush().unwrap();

        assert_eq!(
            synced.get_blockchain_info().unwrap(),
            batched.get_blockchain_info().unwrap()
        );
        for block in &chain {
            let n = block.number();
            assert_eq!(
                synced.retrieve_block_by_number(n).unwrap(),
                batched.retrieve_block_by_number(n).unwrap()
            );
            for bytes in &block.data.data {
                let id = tx_id_from_envelope(bytes).unwrap_or_default();
                if id.is_empty() {
                    continue;
                }
                assert_eq!(
                    synced.retrieve_tx_by_id(&id).unwrap(),
                    batched.retrieve_tx_by_id(&id).unwrap()
                );
                assert_eq!(
                    synced.retrieve_tx_validation_code_by_tx_id(&id).unwrap(),
                    batched.retrieve_tx_validation_code_by_tx_id(&id).unwrap()
                );
            }
        }

        let checkpoint = |p: &ledger_blkstorage::BlockStoreProvider| {
            let handle = p.index_db().handle(LEDGER).unwrap();
            (
                handle.get(&KeyPrefix::checkpoint_key()).unwrap(),
                handle.get(&KeyPrefix::index_checkpoint_key()).unwrap(),
            )
        };
        let (sync_cp, sync_indexed) = checkpoint(&sync_provider);
        assert!(sync_cp.is_some());
        assert_eq!((sync_cp, sync_indexed), checkpoint(&batch_provider));

        let files = |root: &std::path::Path| {
            std::fs::read(root.join("chains").join(LEDGER).join("blockfile_000000")).unwrap()
        };
        assert_eq!(files(sync_dir.path()), files(batch_dir.path()));
    }

    // =========================================================================
    // CORRUPTION REPORTING
    // =========================================================================

    #[test]
    fn test_malformed_index_value_is_reported_then_index_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let provider = memory_provider(dir.path());
        let store = provider.open(LEDGER).unwrap();
        for block in make_chain(3, 1) {
            store.add_block(&block).unwrap();
        }

        {
            let handle = provider.index_db().handle(LEDGER).unwrap();
            handle
                .put(&KeyPrefix::block_number_key(1), &[0xde, 0xad, 0xff], true)
                .unwrap();
        }

        let err = store.retrieve_block_by_number(1).unwrap_err();
        assert!(err.is_corruption(), "{err}");
        assert!(!err.is_not_found());
        match &err {
            StorageError::CorruptIndexValue { value, .. } => assert_eq!(value, &[0xde, 0xad, 0xff]),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.to_string().contains("deadff"), "{err}");

        // other entries are unaffected
        assert_eq!(store.retrieve_block_by_number(2).unwrap().number(), 2);

        provider.index_db().close().unwrap();
        assert!(matches!(
            store.retrieve_block_by_number(2),
            Err(StorageError::IndexUnavailable)
        ));
        assert!(matches!(
            store.retrieve_tx_by_id(&tx_id(0, 0)),
            Err(StorageError::IndexUnavailable)
        ));
    }

    // =========================================================================
    // CONCURRENCY
    // =========================================================================

    #[test]
    fn test_readers_run_alongside_writer() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(dir.path());
        let store = provider.open(LEDGER).unwrap();
        let chain = Arc::new(make_chain(200, 2));

        std::thread::scope(|s| {
            let writer = {
                let store = Arc::clone(&store);
                let chain = Arc::clone(&chain);
                s.spawn(move || {
                    for (n, block) in chain.iter().enumerate() {
                        if n % 10 == 9 {
                            store.add_block(block).unwrap();
                        } else {
                            store.add_block_no_sync(block).unwrap();
                        }
                    }
                    store.flush().unwrap();
                })
            };

            for _ in 0..3 {
                let store = Arc::clone(&store);
                let chain = Arc::clone(&chain);
                s.spawn(move || {
                    for i in 0..500u64 {
                        let height = store.get_blockchain_info().unwrap().height;
                        if height == 0 {
                            std::thread::yield_now();
                            continue;
                        }
                        let n = (i * 7) % height;
                        assert_eq!(store.retrieve_block_by_number(n).unwrap(), chain[n as usize]);
                    }
                });
            }

            writer.join().unwrap();
        });

        assert_eq!(store.get_blockchain_info().unwrap().height, 200);
    }

    #[test]
    fn test_added_tx_stays_visible_while_flushing() {
        let dir = tempfile::tempdir().unwrap();
        let provider = memory_provider(dir.path());
        let store = provider.open(LEDGER).unwrap();
        let chain = Arc::new(make_chain(1500, 1));
        let published = AtomicU64::new(0);
        let done = AtomicBool::new(false);

        std::thread::scope(|s| {
            s.spawn(|| {
                for block in chain.iter() {
                    store.add_block_no_sync(block).unwrap();
                    published.store(block.number() + 1, Ordering::Release);
                    store.flush().unwrap();
                }
                done.store(true, Ordering::Release);
            });

            for _ in 0..3 {
                s.spawn(|| {
                    let mut misses = 0;
                    while !done.load(Ordering::Acquire) {
                        let Some(last) = published.load(Ordering::Acquire).checked_sub(1) else {
                            std::thread::yield_now();
                            continue;
                        };
                        let id = tx_id(last, 0);
                        if !store.tx_id_exists(&id).unwrap() {
                            misses += 1;
                        }
                        match store.retrieve_tx_by_id(&id) {
                            Ok(bytes) => assert_eq!(bytes, chain[last as usize].data.data[0]),
                            Err(StorageError::TxNotFound { .. }) => misses += 1,
                            Err(other) => panic!("unexpected error {other}"),
                        }
                    }
                    assert_eq!(misses, 0);
                });
            }
        });
    }
}

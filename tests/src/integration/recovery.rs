//! # Recovery Scenarios
//!
//! Reopening a storage root after the index was lost, after a crash left a
//! partial record behind, and after block files were damaged.

#[cfg(test)]
mod tests {
    use std::fs::OpenOptions;
    use std::io::{Seek, SeekFrom, Write};
    use std::path::{Path, PathBuf};

    use ledger_blkstorage::{BlockStoreApi, BlockStoreConfig, StorageError};
    use ledger_types::tx_id_from_envelope;
    use ledger_types::wire::put_uvarint;

    use crate::fixtures::{
        make_chain, memory_provider, provider, provider_with, random_chain, tx_id, LEDGER,
    };

    fn ledger_dir(root: &Path) -> PathBuf {
        root.join("chains").join(LEDGER)
    }

    fn block_file(root: &Path, file_id: u32) -> PathBuf {
        ledger_dir(root).join(format!("blockfile_{file_id:06}"))
    }

    fn block_files(root: &Path) -> usize {
        std::fs::read_dir(ledger_dir(root))
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .starts_with("blockfile_")
            })
            .count()
    }

    fn small_files(root: &Path) -> BlockStoreConfig {
        BlockStoreConfig::new(root).with_max_block_file_size(2 * 1024)
    }

    #[test]
    fn test_memory_index_is_rebuilt_from_block_files() {
        let dir = tempfile::tempdir().unwrap();
        let chain = random_chain(3, 30, 4);
        {
            let provider = memory_provider(dir.path());
            let store = provider.open(LEDGER).unwrap();
            for block in &chain {
                store.add_block_no_sync(block).unwrap();
            }
            provider.close().unwrap();
        }

        let provider = memory_provider(dir.path());
        let store = provider.open(LEDGER).unwrap();
        let info = store.get_blockchain_info().unwrap();
        assert_eq!(info.height, 30);
        assert_eq!(info.current_block_hash, chain[29].hash());
        assert_eq!(info.previous_block_hash, chain[28].hash());
        for block in &chain {
            assert_eq!(&store.retrieve_block_by_hash(&block.hash()).unwrap(), block);
        }
        for bytes in &chain[29].data.data {
            match tx_id_from_envelope(bytes) {
                Ok(id) if !id.is_empty() => {
                    assert_eq!(&store.retrieve_tx_by_id(&id).unwrap(), bytes)
                }
                _ => {}
            }
        }
    }

    #[test]
    fn test_deleted_index_is_rebuilt_across_rolled_files() {
        let dir = tempfile::tempdir().unwrap();
        let chain = make_chain(40, 3);
        {
            let provider = provider_with(small_files(dir.path()));
            let store = provider.open(LEDGER).unwrap();
            for block in &chain {
                store.add_block(block).unwrap();
            }
        }
        assert!(block_files(dir.path()) > 2);
        std::fs::remove_dir_all(dir.path().join("index")).unwrap();

        let provider = provider_with(small_files(dir.path()));
        let store = provider.open(LEDGER).unwrap();
        assert_eq!(store.get_blockchain_info().unwrap().height, 40);
        for block in &chain {
            let n = block.number();
            assert_eq!(&store.retrieve_block_by_number(n).unwrap(), block);
            assert_eq!(
                store.retrieve_tx_by_id(&tx_id(n, 1)).unwrap(),
                block.data.data[1]
            );
        }

        // writing continues where the files end
        let next = ledger_types::Block::new(40, chain[39].hash(), vec![b"tail".to_vec()]);
        store.add_block(&next).unwrap();
        assert_eq!(store.retrieve_block_by_number(40).unwrap(), next);
    }

    #[test]
    fn test_partial_record_after_crash_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let chain = make_chain(6, 2);
        {
            let provider = provider(dir.path());
            let store = provider.open(LEDGER).unwrap();
            for block in &chain[..5] {
                store.add_block(block).unwrap();
            }
        }

        let path = block_file(dir.path(), 0);
        let committed_len = std::fs::metadata(&path).unwrap().len();
        let mut torn = Vec::new();
        put_uvarint(&mut torn, 400);
        torn.extend_from_slice(&[0xAB; 100]);
        OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(&torn)
            .unwrap();

        let provider = provider(dir.path());
        let store = provider.open(LEDGER).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), committed_len);
        assert_eq!(store.get_blockchain_info().unwrap().height, 5);

        store.add_block(&chain[5]).unwrap();
        assert_eq!(store.retrieve_block_by_number(5).unwrap(), chain[5]);
        assert_eq!(store.retrieve_block_by_number(4).unwrap(), chain[4]);
    }

    #[test]
    fn test_complete_records_past_checkpoint_are_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let chain = make_chain(4, 1);
        {
            let provider = provider(dir.path());
            let store = provider.open(LEDGER).unwrap();
            store.add_block(&chain[0]).unwrap();
        }
        // append block 1 as a whole record the index never heard of
        {
            let scratch = tempfile::tempdir().unwrap();
            let provider = memory_provider(scratch.path());
            let store = provider.open(LEDGER).unwrap();
            store.add_block(&chain[0]).unwrap();
            store.add_block(&chain[1]).unwrap();
            provider.close().unwrap();

            let source = std::fs::read(block_file(scratch.path(), 0)).unwrap();
            let committed = std::fs::metadata(block_file(dir.path(), 0)).unwrap().len() as usize;
            OpenOptions::new()
                .append(true)
                .open(block_file(dir.path(), 0))
                .unwrap()
                .write_all(&source[committed..])
                .unwrap();
        }

        let provider = provider(dir.path());
        let store = provider.open(LEDGER).unwrap();
        assert_eq!(store.get_blockchain_info().unwrap().height, 2);
        assert_eq!(store.retrieve_block_by_number(1).unwrap(), chain[1]);
        assert!(store.tx_id_exists(&tx_id(1, 0)).unwrap());
        store.add_block(&chain[2]).unwrap();
    }

    #[test]
    fn test_file_shorter_than_checkpoint_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            let provider = provider(dir.path());
            let store = provider.open(LEDGER).unwrap();
            for block in make_chain(3, 1) {
                store.add_block(&block).unwrap();
            }
        }
        let path = block_file(dir.path(), 0);
        let len = std::fs::metadata(&path).unwrap().len();
        OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(len / 2)
            .unwrap();

        let provider = provider(dir.path());
        let err = provider.open(LEDGER).unwrap_err();
        assert!(matches!(err, StorageError::RecoveryFailed { .. }), "{err}");
        // the failed open does not leak an index reference
        assert_eq!(provider.index_db().ref_count(), 0);
    }

    #[test]
    fn test_damaged_record_fails_only_its_reads() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(dir.path());
        let store = provider.open(LEDGER).unwrap();
        let chain = make_chain(3, 1);
        for block in &chain {
            store.add_block(block).unwrap();
        }

        let (first, _) = ledger_blkstorage::serialize_block(&chain[0]);
        let (second, _) = ledger_blkstorage::serialize_block(&chain[1]);
        let mut prefix = Vec::new();
        put_uvarint(&mut prefix, first.len() as u64);
        let record0 = prefix.len() + first.len() + 4;
        let mut prefix1 = Vec::new();
        put_uvarint(&mut prefix1, second.len() as u64);
        let inside_block1 = (record0 + prefix1.len() + second.len() / 2) as u64;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(block_file(dir.path(), 0))
            .unwrap();
        file.seek(SeekFrom::Start(inside_block1)).unwrap();
        let mut byte = [0u8; 1];
        std::io::Read::read_exact(&mut file, &mut byte).unwrap();
        file.seek(SeekFrom::Start(inside_block1)).unwrap();
        file.write_all(&[byte[0] ^ 0xFF]).unwrap();

        let err = store.retrieve_block_by_number(1).unwrap_err();
        assert!(matches!(err, StorageError::ChecksumMismatch { .. }), "{err}");
        assert!(err.is_corruption());
        assert_eq!(store.retrieve_block_by_number(0).unwrap(), chain[0]);
        assert_eq!(store.retrieve_block_by_number(2).unwrap(), chain[2]);
    }
}

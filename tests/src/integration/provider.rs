//! # Provider Scenarios
//!
//! Ledger lifecycle under one storage root: idempotent open, the root lock,
//! reference counting of the shared index and close.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ledger_blkstorage::{
        BlockStoreApi, BlockStoreConfig, BlockStoreProvider, LockError, StorageError,
    };

    use crate::fixtures::{make_chain, provider, LEDGER};

    #[test]
    fn test_open_returns_the_same_store() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(dir.path());

        let first = provider.open(LEDGER).unwrap();
        let second = provider.open(LEDGER).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.index_db().ref_count(), 1);

        first.add_block(&make_chain(1, 1)[0]).unwrap();
        assert_eq!(second.get_blockchain_info().unwrap().height, 1);
    }

    #[test]
    fn test_second_provider_on_same_root_is_locked_out() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(dir.path());

        match BlockStoreProvider::new(BlockStoreConfig::new(dir.path())) {
            Err(StorageError::Lock(LockError::DatabaseLocked { holder_pid, .. })) => {
                assert_eq!(holder_pid, Some(std::process::id()));
            }
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("second provider acquired a held root"),
        }

        drop(provider);
        BlockStoreProvider::new(BlockStoreConfig::new(dir.path())).unwrap();
    }

    #[test]
    fn test_close_shuts_down_stores_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let chain = make_chain(3, 2);
        let provider = provider(dir.path());
        let store = provider.open(LEDGER).unwrap();
        for block in &chain {
            store.add_block_no_sync(block).unwrap();
        }

        provider.close().unwrap();
        provider.close().unwrap();
        assert!(store.is_closed());
        assert!(provider.index_db().is_closed());
        assert!(matches!(
            store.add_block(&chain[0]),
            Err(StorageError::StoreClosed { .. })
        ));
        assert!(matches!(
            provider.open(LEDGER),
            Err(StorageError::ProviderClosed)
        ));
        drop(provider);

        // pending blocks were flushed by close
        let provider = crate::fixtures::provider(dir.path());
        let store = provider.open(LEDGER).unwrap();
        assert_eq!(store.get_blockchain_info().unwrap().height, 3);
        assert_eq!(store.retrieve_block_by_number(2).unwrap(), chain[2]);
    }

    #[test]
    fn test_index_stays_open_while_ledgers_reference_it() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(dir.path());
        let left = provider.open("left").unwrap();
        let right = provider.open("right").unwrap();
        assert_eq!(provider.index_db().ref_count(), 2);

        left.shutdown().unwrap();
        assert_eq!(provider.index_db().ref_count(), 1);
        assert!(!provider.index_db().is_closed());
        right.add_block(&make_chain(1, 1)[0]).unwrap();

        // a store shut down on its own is reopened on demand
        let reopened = provider.open("left").unwrap();
        assert!(!Arc::ptr_eq(&left, &reopened));
        assert!(!reopened.is_closed());
        assert_eq!(provider.index_db().ref_count(), 2);
    }

    #[test]
    fn test_ledger_ids_are_validated() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(dir.path());
        for bad in ["", "Upper", "../escape", "9lives", "with space"] {
            assert!(
                matches!(provider.open(bad), Err(StorageError::InvalidLedgerId { .. })),
                "{bad:?}"
            );
        }
        assert!(provider.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_and_exists() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(dir.path());
        provider.open("beta").unwrap();
        provider.open("alpha.1").unwrap();

        assert_eq!(provider.list().unwrap(), vec!["alpha.1", "beta"]);
        assert!(provider.exists("beta").unwrap());
        assert!(!provider.exists("gamma").unwrap());
    }
}

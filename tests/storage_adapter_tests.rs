//! Spill segments through the storage adapters.

use sortmerge_core::prelude::*;
use sortmerge_core::tuple;
use sortmerge_io::storage::FsStorage;
use sortmerge_io::MemoryStorage;
use sortmerge_mem::error::Error as MemError;
use sortmerge_mem::{Codec, MemoryBudgetImpl, SpillManager, Storage};

fn page() -> Vec<Tuple> {
    (0..32i32).map(|i| tuple![i, format!("row-{i}")]).collect()
}

fn round_trip(storage: Box<dyn Storage>, root: &str, codec: Codec) {
    let mut mgr = SpillManager::new(storage, codec, root.to_string());
    let budget = MemoryBudgetImpl::new(1 << 20);
    let written = page();

    let meta = mgr.write_page(&written, SpillId::new(1), 0, 0).unwrap();
    assert_eq!(meta.tuples, 32);
    assert!(meta.path.starts_with(root));
    assert_eq!(mgr.read_page(&meta, &budget).unwrap(), written);
    assert_eq!(budget.used_bytes(), 0, "decode buffer must be released");

    mgr.delete_segment(&meta.name).unwrap();
    assert!(mgr.list_segments().is_empty());
}

#[test]
fn memory_storage_round_trip() {
    let storage = MemoryStorage::new();
    round_trip(Box::new(storage.clone()), "spill", Codec::None);
    assert!(storage.is_empty());
}

#[test]
fn fs_storage_round_trip() {
    let dir = std::env::temp_dir().join(format!("sortmerge-storage-{}", std::process::id()));
    let root = dir.to_string_lossy().into_owned();
    round_trip(Box::new(FsStorage::new()), &root, Codec::None);
    assert!(FsStorage::new().list(&root).unwrap().is_empty());
    let _ = std::fs::remove_dir_all(&dir);
}

#[cfg(feature = "zstd")]
#[test]
fn compressed_segments_round_trip() {
    round_trip(Box::new(MemoryStorage::new()), "spill", Codec::Zstd);
}

#[test]
fn corrupted_segment_fails_checksum() {
    let storage = MemoryStorage::new();
    let mut mgr = SpillManager::new(Box::new(storage.clone()), Codec::None, "spill".into());
    let meta = mgr.write_page(&page(), SpillId::new(2), 0, 0).unwrap();
    assert!(storage.corrupt(&meta.path, 40));

    let err = mgr.read_page(&meta, &MemoryBudgetImpl::new(1 << 20)).unwrap_err();
    assert!(matches!(err, MemError::ChecksumMismatch(_)));
}

#[test]
fn decode_buffer_is_bounded_by_the_budget() {
    let mut mgr = SpillManager::new(Box::new(MemoryStorage::new()), Codec::None, "spill".into());
    let meta = mgr.write_page(&page(), SpillId::new(3), 0, 0).unwrap();
    let err = mgr.read_page(&meta, &MemoryBudgetImpl::new(16)).unwrap_err();
    assert!(matches!(err, MemError::BudgetExceeded { .. }));
}

#[test]
fn unknown_codec_name_is_rejected() {
    assert!(Codec::from_name("brotli").is_err());
    let cfg = EngineConfig {
        spill_codec: "brotli".into(),
        ..Default::default()
    };
    assert!(sortmerge_io::storage::spill_manager_from_config(&cfg).is_err());
}

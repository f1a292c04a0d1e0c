//! In-memory spill storage, for tests and for joins that must not touch disk.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use sortmerge_mem::error::{Error as MemError, Result as MemResult};
use sortmerge_mem::Storage;

/// Shared map from path to bytes. Clones see the same contents, so a test
/// can keep a handle while the spill manager owns another.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    data: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        // The map is always left consistent, so a poisoned lock is still usable.
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.map().contains_key(path)
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }

    /// Total bytes stored.
    pub fn total_bytes(&self) -> usize {
        self.map().values().map(Vec::len).sum()
    }

    /// Flip one byte of a stored object, for checksum tests.
    pub fn corrupt(&self, path: &str, offset: usize) -> bool {
        match self.map().get_mut(path).and_then(|b| b.get_mut(offset)) {
            Some(byte) => {
                *byte ^= 0xFF;
                true
            }
            None => false,
        }
    }
}

impl Storage for MemoryStorage {
    fn write(&self, path: &str, bytes: &[u8]) -> MemResult<()> {
        self.map().insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn read_range(&self, path: &str, offset: u64, len: usize) -> MemResult<Vec<u8>> {
        let map = self.map();
        let bytes = map
            .get(path)
            .ok_or_else(|| MemError::Storage(format!("path not found: {path}")))?;
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        if start > bytes.len() {
            return Err(MemError::Storage(format!(
                "offset {offset} past end of {path} ({} bytes)",
                bytes.len()
            )));
        }
        let end = start.saturating_add(len).min(bytes.len());
        Ok(bytes[start..end].to_vec())
    }

    fn delete(&self, path: &str) -> MemResult<()> {
        self.map().remove(path);
        Ok(())
    }

    fn list(&self, prefix: &str) -> MemResult<Vec<String>> {
        Ok(self
            .map()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn size(&self, path: &str) -> MemResult<u64> {
        self.map()
            .get(path)
            .map(|b| b.len() as u64)
            .ok_or_else(|| MemError::Storage(format!("path not found: {path}")))
    }

    fn etag(&self, path: &str) -> MemResult<Option<String>> {
        Ok(self
            .map()
            .get(path)
            .map(|b| blake3::hash(b).to_hex().to_string()))
    }
}

//! Spill manager for the external sort's runs.
//!
//! A run that does not fit in memory is written as a sequence of page-sized
//! segments so the merge phase can hold exactly one page per run.

pub mod codec;
pub mod segment;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use sortmerge_core::budget::MemoryBudget;
use sortmerge_core::id::SpillId;
use sortmerge_core::types::Tuple;

use crate::error::{Error, Result};
use crate::guard::BudgetGuardImpl;

pub use codec::Codec;
pub use segment::{SegmentHeader, SegmentMeta, SegmentName, HEADER_LEN};

/// Abstract storage interface for spill segments.
///
/// Implemented by `sortmerge-io::FsStorage` for the local filesystem and by
/// `sortmerge-io::MemoryStorage` for tests.
pub trait Storage: Send + Sync {
    /// Write bytes to a path. Creates parent directories if needed.
    fn write(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Read a byte range from a path. Returns at most `len` bytes.
    fn read_range(&self, path: &str, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// Delete a path. Idempotent (no error if path doesn't exist).
    fn delete(&self, path: &str) -> Result<()>;

    /// List all paths under a prefix (optional, for cleanup/debugging).
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Get size of a path in bytes (optional, for validation).
    fn size(&self, path: &str) -> Result<u64>;

    /// Get an ETag or hash for a path (optional, for caching/validation).
    fn etag(&self, path: &str) -> Result<Option<String>>;
}

/// Central manager for spilling sorted-run pages to storage.
///
/// Responsibilities:
/// - Serialize/compress pages of tuples with checksums
/// - Track segment metadata in memory
/// - Provide write_page/read_page APIs for the external sort
pub struct SpillManager {
    storage: Box<dyn Storage>,
    codec: Codec,
    root_dir: String,
    next_run: AtomicU32,
    segments: HashMap<SegmentName, SegmentMeta>,
}

impl SpillManager {
    /// Create a new SpillManager with the given storage backend.
    pub fn new(storage: Box<dyn Storage>, codec: Codec, root_dir: String) -> Self {
        Self {
            storage,
            codec,
            root_dir,
            next_run: AtomicU32::new(0),
            segments: HashMap::new(),
        }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Write one page of a run to storage and return its metadata.
    ///
    /// Steps:
    /// 1. Serialize tuples with serde_json
    /// 2. Compress payload with configured codec
    /// 3. Compute BLAKE3 checksum over header + compressed payload
    /// 4. Write to storage
    pub fn write_page(
        &mut self,
        tuples: &[Tuple],
        spill_id: SpillId,
        run_index: u32,
        page_index: u32,
    ) -> Result<SegmentMeta> {
        let uncompressed =
            serde_json::to_vec(tuples).map_err(|e| Error::Codec(format!("json serialize: {e}")))?;
        let uncompressed_len = uncompressed.len() as u64;

        let compressed = codec::compress(self.codec, &uncompressed)?;
        let compressed_len = compressed.len() as u64;

        let header = SegmentHeader::new(self.codec, uncompressed_len, compressed_len);
        let header_bytes = header.to_bytes();

        let mut hasher = blake3::Hasher::new();
        hasher.update(&header_bytes);
        hasher.update(&compressed);
        let checksum: [u8; 32] = hasher.finalize().into();

        let name = SegmentName::new(spill_id, run_index, page_index);
        let path = format!("{}/{}.seg", self.root_dir, name.0);

        let mut full_segment = Vec::with_capacity(header_bytes.len() + compressed.len());
        full_segment.extend_from_slice(&header_bytes);
        full_segment.extend_from_slice(&compressed);

        self.storage.write(&path, &full_segment)?;

        let etag = self.storage.etag(&path).ok().flatten();

        let meta = SegmentMeta {
            name: name.clone(),
            tuples: tuples.len() as u64,
            path,
            codec: self.codec,
            uncompressed_len,
            compressed_len,
            checksum,
            etag,
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(segment = %meta.name.0, tuples = meta.tuples, bytes = compressed_len, "spilled run page");

        self.segments.insert(name, meta.clone());
        Ok(meta)
    }

    /// Read one page back, verifying its checksum.
    ///
    /// The decompression buffer is accounted against `budget` while it is alive.
    pub fn read_page(
        &self,
        meta: &SegmentMeta,
        budget: &dyn MemoryBudget<Guard = BudgetGuardImpl>,
    ) -> Result<Vec<Tuple>> {
        let total_len = HEADER_LEN + meta.compressed_len as usize;
        let full_segment = self.storage.read_range(&meta.path, 0, total_len)?;

        if full_segment.len() < HEADER_LEN {
            return Err(Error::Storage("segment too short".into()));
        }

        let mut hasher = blake3::Hasher::new();
        hasher.update(&full_segment);
        let computed_checksum: [u8; 32] = hasher.finalize().into();
        if computed_checksum != meta.checksum {
            return Err(Error::ChecksumMismatch(meta.name.0.clone()));
        }

        let header = SegmentHeader::from_bytes(&full_segment[..HEADER_LEN])?;
        header.validate_sizes(100 * 1024 * 1024, 100 * 1024 * 1024)?; // 100MB sanity limit

        let compressed = &full_segment[HEADER_LEN..];

        let requested = header.uncompressed_len as usize;
        let _guard = budget
            .try_acquire(requested, "spill_decompress")
            .ok_or_else(|| Error::BudgetExceeded {
                tag: "spill_decompress",
                requested,
                capacity: budget.capacity_bytes(),
                used: budget.used_bytes(),
            })?;

        let uncompressed = codec::decompress(header.codec, compressed)?;

        serde_json::from_slice(&uncompressed)
            .map_err(|e| Error::Codec(format!("json deserialize: {e}")))
    }

    /// Generate a unique run index for this spill session.
    pub fn next_run_index(&self) -> u32 {
        self.next_run.fetch_add(1, Ordering::Relaxed)
    }

    /// Retrieve stored segment metadata by name.
    pub fn get_segment(&self, name: &SegmentName) -> Option<&SegmentMeta> {
        self.segments.get(name)
    }

    /// Delete a segment from storage and remove its metadata.
    pub fn delete_segment(&mut self, name: &SegmentName) -> Result<()> {
        if let Some(meta) = self.segments.remove(name) {
            self.storage.delete(&meta.path)?;
        }
        Ok(())
    }

    /// List all segment names currently tracked.
    pub fn list_segments(&self) -> Vec<SegmentName> {
        self.segments.keys().cloned().collect()
    }
}

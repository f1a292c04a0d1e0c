//! Segment file header and metadata.
//!
//! One segment holds one page of a sorted run (a JSON array of tuples).
//! Layout on disk:
//! [ magic: u32 ][ version: u16 ][ codec: u8 ][ reserved: u8 ]
//! [ uncompressed_len: u64 ][ compressed_len: u64 ]
//! [ payload bytes … ]
//!
//! End-to-end checksum is computed over (header || payload) using blake3.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use super::Codec;

pub const MAGIC: u32 = 0x534D4A52; // "SMJR" (sort-merge join run)
pub const VERSION: u16 = 1;
pub const HEADER_LEN: usize = 4 + 2 + 1 + 1 + 8 + 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentHeader {
    pub magic: u32,
    pub version: u16,
    pub codec: Codec,
    pub uncompressed_len: u64,
    pub compressed_len: u64,
}

impl SegmentHeader {
    pub fn new(codec: Codec, uncompressed_len: u64, compressed_len: u64) -> Self {
        Self { magic: MAGIC, version: VERSION, codec, uncompressed_len, compressed_len }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.extend_from_slice(&self.magic.to_le_bytes());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.push(self.codec as u8);
        out.push(0u8); // reserved
        out.extend_from_slice(&self.uncompressed_len.to_le_bytes());
        out.extend_from_slice(&self.compressed_len.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Storage("short header".into()));
        }
        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        let codec = super::Codec::from_u8(bytes[6])?;
        // bytes[7] reserved
        let uncompressed_len = read_u64(&bytes[8..16]);
        let compressed_len = read_u64(&bytes[16..24]);

        if magic != MAGIC || version != VERSION {
            return Err(Error::Storage("bad magic/version".into()));
        }

        Ok(Self { magic, version, codec, uncompressed_len, compressed_len })
    }

    /// Validate that the sizes in the header are reasonable.
    /// This prevents excessive allocations from corrupted/malicious data.
    pub fn validate_sizes(&self, max_uncompressed: u64, max_compressed: u64) -> Result<()> {
        if self.uncompressed_len > max_uncompressed {
            return Err(Error::Storage(format!(
                "uncompressed_len {} exceeds max {}",
                self.uncompressed_len, max_uncompressed
            )));
        }
        if self.compressed_len > max_compressed {
            return Err(Error::Storage(format!(
                "compressed_len {} exceeds max {}",
                self.compressed_len, max_compressed
            )));
        }
        if self.compressed_len > self.uncompressed_len && self.codec != Codec::None {
            return Err(Error::Storage(
                "compressed_len > uncompressed_len for compressed codec".into()
            ));
        }
        Ok(())
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

/// Human-friendly name for a segment: one page of one sorted run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentName(pub String);

impl SegmentName {
    pub fn new(id: sortmerge_core::id::SpillId, run_index: u32, page_index: u32) -> Self {
        SegmentName(format!("spill{}_run{}_page{}", id.get(), run_index, page_index))
    }
}

/// Minimal metadata the engine keeps for a spilled segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub name: SegmentName,
    /// Tuples stored in the segment.
    pub tuples: u64,
    pub path: String,
    pub codec: Codec,
    pub uncompressed_len: u64,
    pub compressed_len: u64,
    pub checksum: [u8; 32],
    pub etag: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_and_rejects_bad_magic() {
        let header = SegmentHeader::new(Codec::None, 120, 120);
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_LEN);
        let back = SegmentHeader::from_bytes(&bytes).unwrap();
        assert_eq!(back.uncompressed_len, 120);

        let mut corrupt = bytes.clone();
        corrupt[0] ^= 0xff;
        assert!(SegmentHeader::from_bytes(&corrupt).is_err());
        assert!(SegmentHeader::from_bytes(&bytes[..4]).is_err());
    }

    #[test]
    fn segment_names_are_per_page() {
        let id = sortmerge_core::id::SpillId::new(9);
        assert_eq!(SegmentName::new(id, 2, 5).0, "spill9_run2_page5");
    }
}

//! Engine configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Page size of the buffer manager the join budgets are expressed against.
pub const DEFAULT_PAGE_SIZE: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Bytes per page. Memory budgets are given in pages and converted with this.
    pub page_size_bytes: usize,

    /// Pages granted to a join (and its sorts) when the job does not say otherwise.
    pub default_mem_pages: usize,

    /// Directory for sort-run spill files.
    pub spill_dir: String,

    /// Spill segment compression: "none", "zstd" or "lz4".
    pub spill_codec: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size_bytes: DEFAULT_PAGE_SIZE,
            default_mem_pages: 64,
            spill_dir: "/tmp/sortmerge-spill".to_string(),
            spill_codec: "none".to_string(),
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `SORTMERGE_PAGE_SIZE`: bytes per page
    /// - `SORTMERGE_MEM_PAGES`: default page budget per join
    /// - `SORTMERGE_SPILL_DIR`: spill directory
    /// - `SORTMERGE_SPILL_CODEC`: spill compression codec
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("SORTMERGE_PAGE_SIZE") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.page_size_bytes = v;
            }
        }

        if let Ok(s) = std::env::var("SORTMERGE_MEM_PAGES") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.default_mem_pages = v;
            }
        }

        if let Ok(s) = std::env::var("SORTMERGE_SPILL_DIR") {
            cfg.spill_dir = s;
        }

        if let Ok(s) = std::env::var("SORTMERGE_SPILL_CODEC") {
            cfg.spill_codec = s;
        }

        cfg
    }

    /// Convert a page count into the byte budget it stands for.
    pub fn pages_to_bytes(&self, pages: usize) -> usize {
        pages.saturating_mul(self.page_size_bytes)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size_bytes == 0 {
            return Err(Error::Config("page_size_bytes must be positive".into()));
        }
        if self.default_mem_pages == 0 {
            return Err(Error::Config("default_mem_pages must be positive".into()));
        }
        if !matches!(self.spill_codec.as_str(), "none" | "zstd" | "lz4") {
            return Err(Error::Config(format!(
                "unknown spill codec '{}'",
                self.spill_codec
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = EngineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.pages_to_bytes(3), 3 * DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn rejects_zero_page_size_and_unknown_codec() {
        let cfg = EngineConfig {
            page_size_bytes: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = EngineConfig {
            spill_codec: "brotli".into(),
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }
}

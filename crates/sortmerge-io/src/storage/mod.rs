//! Storage adapters implementing `sortmerge_mem::Storage`, and the spill
//! manager built from an `EngineConfig`.

mod fs;
pub use fs::FsStorage;

use sortmerge_core::config::EngineConfig;
use sortmerge_mem::{Codec, SpillManager};

use crate::error::Result;

/// Filesystem spill manager rooted at `cfg.spill_dir`, compressing with
/// `cfg.spill_codec`.
pub fn spill_manager_from_config(cfg: &EngineConfig) -> Result<SpillManager> {
    let codec = Codec::from_name(&cfg.spill_codec)?;
    Ok(SpillManager::new(Box::new(FsStorage::new()), codec, cfg.spill_dir.clone()))
}

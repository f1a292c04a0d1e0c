use thiserror::Error;

/// Result type local to sortmerge-mem.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("memory budget exceeded for tag '{tag}': requested {requested} bytes, capacity {capacity}, used {used}")]
    BudgetExceeded {
        tag: &'static str,
        requested: usize,
        capacity: usize,
        used: usize,
    },

    #[error("spill storage error: {0}")]
    Storage(String),

    #[error("unsupported codec: {0}")]
    CodecUnsupported(&'static str),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("checksum mismatch for segment '{0}'")]
    ChecksumMismatch(String),
}

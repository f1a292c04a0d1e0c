#![forbid(unsafe_code)]
//! sortmerge-io: the I/O edges of the sort-merge join engine.
//!
//! - Spill storage backends implementing `sortmerge_mem::Storage`
//!   (local filesystem, in-memory for tests).
//! - `CsvScan`, a pull-interface source over CSV files.
//! - CSV / NDJSON tuple writers.
//! - YAML join-job documents and their runner.

pub mod error;
pub mod job;
pub mod memory_storage;
pub mod readers;
pub mod storage;
pub mod writers;

pub use error::{Error, Result};
pub use job::{parse_join_job, JoinJob, JobReport};
pub use memory_storage::MemoryStorage;
pub use readers::csv::CsvScan;
pub use storage::FsStorage;

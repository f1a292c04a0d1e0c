//! Streaming tuple writers.

pub mod csv;
pub mod jsonl;

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use sortmerge_core::prelude::Schema;
use sortmerge_core::types::Tuple;

use crate::error::Result;

pub use self::csv::CsvTupleWriter;
pub use self::jsonl::JsonlWriter;

/// Sink for join output.
pub trait TupleWriter {
    fn write_tuple(&mut self, tuple: &Tuple) -> Result<()>;

    /// Flush buffered output.
    fn finish(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkFormat {
    #[default]
    Csv,
    Jsonl,
}

/// Create `path` and return a writer for `format` with `schema`'s column names.
pub fn create_writer(path: &Path, format: SinkFormat, schema: &Schema) -> Result<Box<dyn TupleWriter>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    Ok(match format {
        SinkFormat::Csv => Box::new(CsvTupleWriter::new(file, schema)?),
        SinkFormat::Jsonl => Box::new(JsonlWriter::new(file, schema)),
    })
}

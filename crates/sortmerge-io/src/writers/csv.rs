//! CSV tuple writer. `NULL` is written as an empty field.

use std::io::Write;

use sortmerge_core::prelude::Schema;
use sortmerge_core::types::{Scalar, Tuple};

use crate::error::Result;

use super::TupleWriter;

pub struct CsvTupleWriter<W: Write> {
    writer: csv::Writer<W>,
    record: Vec<String>,
}

impl<W: Write> CsvTupleWriter<W> {
    /// Writes the header line immediately.
    pub fn new(writer: W, schema: &Schema) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(schema.fields.iter().map(|f| f.name.as_str()))?;
        Ok(Self {
            writer,
            record: Vec::with_capacity(schema.len()),
        })
    }

    pub fn into_inner(mut self) -> Result<W> {
        self.writer.flush()?;
        self.writer
            .into_inner()
            .map_err(|e| crate::Error::Io(e.into_error()))
    }
}

fn field_text(v: &Scalar) -> String {
    match v {
        Scalar::Null => String::new(),
        Scalar::Bin(b) => String::from_utf8_lossy(b).into_owned(),
        other => other.to_string(),
    }
}

impl<W: Write> TupleWriter for CsvTupleWriter<W> {
    fn write_tuple(&mut self, tuple: &Tuple) -> Result<()> {
        self.record.clear();
        self.record.extend(tuple.values.iter().map(field_text));
        self.writer.write_record(&self.record)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

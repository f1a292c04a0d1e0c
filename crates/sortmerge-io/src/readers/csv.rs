//! CSV table scan.
//!
//! Each record becomes one tuple typed by the declared schema. An empty field
//! is `NULL`; anything else must parse as the field's type.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::PathBuf;

use sortmerge_core::prelude::Schema;
use sortmerge_core::schema::DataType;
use sortmerge_core::types::{Scalar, Tuple};
use sortmerge_operators::{OpError, StreamState, TupleStream};

enum Source {
    Path(PathBuf),
    Inline(String),
}

pub struct CsvScan {
    source: Source,
    schema: Schema,
    has_headers: bool,
    reader: Option<csv::Reader<Box<dyn Read + Send>>>,
    record: csv::StringRecord,
    row: u64,
    state: StreamState,
}

impl CsvScan {
    /// Scan the file at `path`; nothing is opened until `open`.
    pub fn from_path(path: impl Into<PathBuf>, schema: Schema) -> Self {
        Self::with_source(Source::Path(path.into()), schema)
    }

    /// Scan CSV text held in memory.
    pub fn from_text(text: impl Into<String>, schema: Schema) -> Self {
        Self::with_source(Source::Inline(text.into()), schema)
    }

    fn with_source(source: Source, schema: Schema) -> Self {
        Self {
            source,
            schema,
            has_headers: true,
            reader: None,
            record: csv::StringRecord::new(),
            row: 0,
            state: StreamState::Created,
        }
    }

    /// Whether the first record is a header line (default: yes).
    pub fn with_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }

    fn describe(&self) -> String {
        match &self.source {
            Source::Path(p) => p.display().to_string(),
            Source::Inline(_) => "<inline>".to_string(),
        }
    }

    fn parse_record(&self) -> Result<Tuple, OpError> {
        if self.record.len() != self.schema.len() {
            return Err(OpError::TypeMismatch(format!(
                "{} row {}: {} fields, schema declares {}",
                self.describe(),
                self.row,
                self.record.len(),
                self.schema.len()
            )));
        }
        let mut values = Vec::with_capacity(self.schema.len());
        for (field, raw) in self.schema.fields.iter().zip(self.record.iter()) {
            let v = parse_value(raw, field.data_type).ok_or_else(|| {
                OpError::TypeMismatch(format!(
                    "{} row {}: '{raw}' is not a valid {:?} for field '{}'",
                    self.describe(),
                    self.row,
                    field.data_type,
                    field.name
                ))
            })?;
            values.push(v);
        }
        let tuple = Tuple::new(values);
        self.schema
            .check_tuple(&tuple)
            .map_err(|e| OpError::TypeMismatch(format!("{} row {}: {e}", self.describe(), self.row)))?;
        Ok(tuple)
    }
}

/// Parse one CSV field as `data_type`; `None` if it does not parse.
pub fn parse_value(raw: &str, data_type: DataType) -> Option<Scalar> {
    if raw.is_empty() {
        return Some(Scalar::Null);
    }
    let s = raw.trim();
    Some(match data_type {
        DataType::Boolean => Scalar::Bool(s.parse().ok()?),
        DataType::Int32 => Scalar::I32(s.parse().ok()?),
        DataType::Int64 => Scalar::I64(s.parse().ok()?),
        DataType::Float32 => Scalar::F32(s.parse().ok()?),
        DataType::Float64 => Scalar::F64(s.parse().ok()?),
        DataType::Utf8 => Scalar::Str(raw.to_string()),
        DataType::Binary => Scalar::Bin(raw.as_bytes().to_vec()),
    })
}

impl TupleStream for CsvScan {
    fn open(&mut self) -> Result<(), OpError> {
        if self.state.is_closed() {
            return Err(OpError::StreamOpenFailed {
                stream: self.describe(),
                reason: "scan was already closed".into(),
            });
        }
        let input: Box<dyn Read + Send> = match &self.source {
            Source::Path(p) => Box::new(File::open(p).map_err(|e| OpError::StreamOpenFailed {
                stream: p.display().to_string(),
                reason: e.to_string(),
            })?),
            Source::Inline(text) => Box::new(Cursor::new(text.clone().into_bytes())),
        };
        self.reader = Some(
            csv::ReaderBuilder::new()
                .has_headers(self.has_headers)
                .from_reader(input),
        );
        self.row = 0;
        self.state = StreamState::Open;
        Ok(())
    }

    fn get_next(&mut self) -> Result<Option<Tuple>, OpError> {
        match self.state {
            StreamState::Created => return Err(OpError::NotOpen),
            StreamState::Closed => return Err(OpError::IteratorClosed),
            StreamState::Finished => return Ok(None),
            StreamState::Open => {}
        }
        let Some(reader) = self.reader.as_mut() else {
            return Err(OpError::NotOpen);
        };
        let more = reader
            .read_record(&mut self.record)
            .map_err(|e| OpError::Stream(format!("{}: {e}", self.describe())))?;
        if !more {
            self.state = StreamState::Finished;
            return Ok(None);
        }
        self.row += 1;
        self.parse_record().map(Some)
    }

    fn close(&mut self) -> Result<(), OpError> {
        self.reader = None;
        self.state = StreamState::Closed;
        Ok(())
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn name(&self) -> &'static str {
        "csv_scan"
    }
}

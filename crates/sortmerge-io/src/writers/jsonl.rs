//! Streaming NDJSON writer: one object per tuple, keyed by output column name.

use std::io::{BufWriter, Write};

use serde_json::{Map, Value};

use sortmerge_core::prelude::Schema;
use sortmerge_core::types::{Scalar, Tuple};

use crate::error::Result;

use super::TupleWriter;

pub struct JsonlWriter<W: Write> {
    writer: BufWriter<W>,
    columns: Vec<String>,
}

impl<W: Write> JsonlWriter<W> {
    pub fn new(writer: W, schema: &Schema) -> Self {
        Self {
            writer: BufWriter::new(writer),
            columns: schema.fields.iter().map(|f| f.name.clone()).collect(),
        }
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| crate::Error::Io(e.into_error()))
    }
}

pub fn scalar_to_json(v: &Scalar) -> Value {
    match v {
        Scalar::Null => Value::Null,
        Scalar::Bool(b) => Value::Bool(*b),
        Scalar::I32(i) => Value::from(*i),
        Scalar::I64(i) => Value::from(*i),
        Scalar::F32(f) => Value::from(f64::from(*f)),
        Scalar::F64(f) => Value::from(*f),
        Scalar::Str(s) => Value::String(s.clone()),
        Scalar::Bin(b) => Value::Array(b.iter().map(|x| Value::from(*x)).collect()),
    }
}

impl<W: Write> TupleWriter for JsonlWriter<W> {
    fn write_tuple(&mut self, tuple: &Tuple) -> Result<()> {
        // Map keeps insertion order with serde_json's `preserve_order`; without
        // it columns come out sorted by name.
        let obj: Map<String, Value> = self
            .columns
            .iter()
            .cloned()
            .zip(tuple.values.iter().map(scalar_to_json))
            .collect();
        serde_json::to_writer(&mut self.writer, &obj)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sortmerge_core::schema::{DataType, Field};
    use sortmerge_core::tuple;

    #[test]
    fn one_object_per_line() {
        let schema = Schema::new(vec![Field::new("a", DataType::Int32), Field::string("b", 4)]);
        let mut w = JsonlWriter::new(Vec::new(), &schema);
        w.write_tuple(&tuple![1i32, "x"]).unwrap();
        w.write_tuple(&Tuple::new(vec![Scalar::I32(2), Scalar::Null])).unwrap();
        w.finish().unwrap();
        let text = String::from_utf8(w.into_inner().unwrap()).unwrap();
        let lines: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["a"], 1);
        assert_eq!(lines[0]["b"], "x");
        assert!(lines[1]["b"].is_null());
    }
}

//! Logical schema types. Pure data; no I/O here.
//!
//! A schema is the ordered sequence of field type tags of one join input,
//! plus the maximum size of every string field. Column positions exposed to
//! callers are 1-based, like the buffer-manager engines this join comes from;
//! `Schema::field` and friends take the 1-based position directly.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Tuple;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int32,
    Int64,
    Float32,
    Float64,
    Utf8,
    Binary,
}

impl DataType {
    /// Whether values of this type carry a total order usable as a join key.
    ///
    /// Booleans and opaque byte blobs are not orderable keys.
    pub const fn is_orderable(self) -> bool {
        matches!(
            self,
            DataType::Int32 | DataType::Int64 | DataType::Float32 | DataType::Float64 | DataType::Utf8
        )
    }

    /// Fixed byte width of the type, `None` for variable-length types.
    pub const fn fixed_width(self) -> Option<usize> {
        match self {
            DataType::Boolean => Some(1),
            DataType::Int32 | DataType::Float32 => Some(4),
            DataType::Int64 | DataType::Float64 => Some(8),
            DataType::Utf8 | DataType::Binary => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "Boolean" | "bool" => DataType::Boolean,
            "Int32" | "i32" | "int" => DataType::Int32,
            "Int64" | "i64" => DataType::Int64,
            "Float32" | "f32" | "real" => DataType::Float32,
            "Float64" | "f64" => DataType::Float64,
            "Utf8" | "string" | "str" => DataType::Utf8,
            "Binary" | "bytes" => DataType::Binary,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    /// Maximum byte size for variable-length fields (`Utf8`, `Binary`).
    #[serde(default)]
    pub max_len: Option<usize>,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            max_len: None,
        }
    }

    /// A string field with a declared maximum size in bytes.
    pub fn string(name: impl Into<String>, max_len: usize) -> Self {
        Self {
            name: name.into(),
            data_type: DataType::Utf8,
            max_len: Some(max_len),
        }
    }

    /// Byte length a join key on this field may declare.
    pub fn key_width(&self) -> Option<usize> {
        self.data_type.fixed_width().or(self.max_len)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field at a 1-based column position.
    pub fn field(&self, column: usize) -> Option<&Field> {
        column.checked_sub(1).and_then(|idx| self.fields.get(idx))
    }

    /// 1-based position of the first field named `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name).map(|i| i + 1)
    }

    /// Field type tags in column order.
    pub fn types(&self) -> Vec<DataType> {
        self.fields.iter().map(|f| f.data_type).collect()
    }

    /// Maximum sizes of the string fields, in column order.
    pub fn string_sizes(&self) -> Vec<usize> {
        self.fields
            .iter()
            .filter(|f| f.data_type == DataType::Utf8)
            .map(|f| f.max_len.unwrap_or(0))
            .collect()
    }

    /// Check that a tuple has this schema's arity, that every non-null value
    /// carries the declared type, and that strings fit their declared size.
    pub fn check_tuple(&self, tuple: &Tuple) -> Result<()> {
        if tuple.len() != self.fields.len() {
            return Err(Error::Schema(format!(
                "tuple has {} fields, schema declares {}",
                tuple.len(),
                self.fields.len()
            )));
        }
        for (field, value) in self.fields.iter().zip(&tuple.values) {
            let Some(actual) = value.data_type() else {
                continue;
            };
            if actual != field.data_type {
                return Err(Error::Schema(format!(
                    "field '{}' declared {:?} but holds {:?}",
                    field.name, field.data_type, actual
                )));
            }
            if let Some(max) = field.max_len {
                if value.byte_len() > max {
                    return Err(Error::Schema(format!(
                        "field '{}' holds {} bytes, max is {}",
                        field.name,
                        value.byte_len(),
                        max
                    )));
                }
            }
        }
        Ok(())
    }
}

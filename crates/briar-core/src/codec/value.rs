//! A materialized value tree.
//!
//! Protocol code reads fields positionally and never builds a `Value`; the
//! tree exists for diagnostics, golden vectors and property tests.

use std::io::{Read, Write};

use super::reader::{self, Reader};
use super::writer::Writer;
use super::{integer_length, length_prefix_length, ValueKind};
use crate::error::{FormatError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Struct(u8, Vec<Value>),
}

impl Value {
    /// Number of bytes this value occupies when encoded.
    pub fn encoded_length(&self) -> usize {
        match self {
            Value::Null | Value::Boolean(_) => 1,
            Value::Integer(i) => integer_length(*i),
            Value::Float(_) => 9,
            Value::String(s) => length_prefix_length(s.len()) + s.len(),
            Value::Bytes(b) => length_prefix_length(b.len()) + b.len(),
            Value::List(items) => 2 + items.iter().map(Value::encoded_length).sum::<usize>(),
            Value::Map(entries) => {
                2 + entries
                    .iter()
                    .map(|(k, v)| k.encoded_length() + v.encoded_length())
                    .sum::<usize>()
            }
            Value::Struct(_, fields) => {
                3 + fields.iter().map(Value::encoded_length).sum::<usize>()
            }
        }
    }

    /// Encodes this value on its own.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::with_capacity(self.encoded_length()));
        writer.write_value(self)?;
        writer.close()
    }

    /// Decodes exactly one value from `bytes`, with no trailing data.
    pub fn from_bytes(bytes: &[u8], max_length: usize) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let value = reader.read_value(max_length)?;
        if !reader.eof()? {
            return Err(FormatError::TrailingData);
        }
        Ok(value)
    }
}

impl<R: Read> Reader<R> {
    /// Reads the next value of any kind. `max_length` bounds every string
    /// and raw value inside it.
    pub fn read_value(&mut self, max_length: usize) -> Result<Value> {
        self.read_value_at(max_length, 0)
    }

    fn read_value_at(&mut self, max_length: usize, depth: usize) -> Result<Value> {
        Ok(match self.peek_kind()?.ok_or(FormatError::UnexpectedEof)? {
            ValueKind::Null => {
                self.read_null()?;
                Value::Null
            }
            ValueKind::Boolean => Value::Boolean(self.read_boolean()?),
            ValueKind::Integer => Value::Integer(self.read_integer()?),
            ValueKind::Float => Value::Float(self.read_float()?),
            ValueKind::String => Value::String(self.read_string(max_length)?),
            ValueKind::Bytes => Value::Bytes(self.read_bytes(max_length)?),
            ValueKind::List => {
                let depth = reader::enter(depth)?;
                self.read_list_start()?;
                let mut items = Vec::new();
                while !self.has_list_end()? {
                    items.push(self.read_value_at(max_length, depth)?);
                }
                self.read_list_end()?;
                Value::List(items)
            }
            ValueKind::Map => {
                let depth = reader::enter(depth)?;
                self.read_map_start()?;
                let mut entries = Vec::new();
                while !self.has_map_end()? {
                    let key = self.read_value_at(max_length, depth)?;
                    let value = self.read_value_at(max_length, depth)?;
                    entries.push((key, value));
                }
                self.read_map_end()?;
                Value::Map(entries)
            }
            ValueKind::Struct => {
                let depth = reader::enter(depth)?;
                let id = self.read_struct_start_any()?;
                let mut fields = Vec::new();
                while !self.has_struct_end()? {
                    fields.push(self.read_value_at(max_length, depth)?);
                }
                self.read_struct_end()?;
                Value::Struct(id, fields)
            }
            ValueKind::End => {
                return Err(FormatError::UnexpectedTag {
                    expected: "value",
                    found: super::tags::END,
                })
            }
        })
    }
}

impl<W: Write> Writer<W> {
    pub fn write_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => self.write_null(),
            Value::Boolean(b) => self.write_boolean(*b),
            Value::Integer(i) => self.write_integer(*i),
            Value::Float(f) => self.write_float(*f),
            Value::String(s) => self.write_string(s),
            Value::Bytes(b) => self.write_bytes(b),
            Value::List(items) => {
                self.write_list_start()?;
                for item in items {
                    self.write_value(item)?;
                }
                self.write_list_end()
            }
            Value::Map(entries) => {
                self.write_map_start()?;
                for (k, v) in entries {
                    self.write_value(k)?;
                    self.write_value(v)?;
                }
                self.write_map_end()
            }
            Value::Struct(id, fields) => {
                self.write_struct_start(*id)?;
                for field in fields {
                    self.write_value(field)?;
                }
                self.write_struct_end()
            }
        }
    }
}

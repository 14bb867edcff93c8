//! Streaming encoder, the dual of [`Reader`](super::Reader).

use std::io::Write;

use super::consumer::{self, Consumer};
use super::tags;
use crate::error::{FormatError, Result};

/// Encodes tagged values into a byte sink.
///
/// Integers and length prefixes always take their narrowest form, so two
/// writers given the same values produce identical bytes.
pub struct Writer<W> {
    output: W,
    consumers: Vec<Box<dyn Consumer>>,
}

impl<W: Write> Writer<W> {
    pub fn new(output: W) -> Self {
        Self {
            output,
            consumers: Vec::new(),
        }
    }

    /// Attaches a consumer that will see every byte written from now on.
    pub fn add_consumer<C: Consumer>(&mut self, consumer: C) {
        self.consumers.push(Box::new(consumer));
    }

    /// Detaches the most recently attached consumer of type `C`.
    pub fn remove_consumer<C: Consumer>(&mut self) -> Option<C> {
        consumer::take(&mut self.consumers)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.output.flush()?;
        Ok(())
    }

    /// Flushes and hands back the underlying sink.
    pub fn close(mut self) -> Result<W> {
        self.flush()?;
        Ok(self.output)
    }

    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        self.output.write_all(bytes)?;
        consumer::feed(&mut self.consumers, bytes)
    }

    pub fn write_null(&mut self) -> Result<()> {
        self.put(&[tags::NULL])
    }

    pub fn write_boolean(&mut self, value: bool) -> Result<()> {
        self.put(&[if value { tags::TRUE } else { tags::FALSE }])
    }

    pub fn write_integer(&mut self, value: i64) -> Result<()> {
        if let Ok(v) = i8::try_from(value) {
            self.put(&[tags::INT_8])?;
            self.put(&v.to_be_bytes())
        } else if let Ok(v) = i16::try_from(value) {
            self.put(&[tags::INT_16])?;
            self.put(&v.to_be_bytes())
        } else if let Ok(v) = i32::try_from(value) {
            self.put(&[tags::INT_32])?;
            self.put(&v.to_be_bytes())
        } else {
            self.put(&[tags::INT_64])?;
            self.put(&value.to_be_bytes())
        }
    }

    pub fn write_float(&mut self, value: f64) -> Result<()> {
        self.put(&[tags::FLOAT_64])?;
        self.put(&value.to_bits().to_be_bytes())
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_length(tags::STRING_8, value.len())?;
        self.put(value.as_bytes())
    }

    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_length(tags::RAW_8, value.len())?;
        self.put(value)
    }

    /// Writes the tag for a string or raw value of `length` bytes, `base`
    /// being the 8-bit variant of that kind.
    fn write_length(&mut self, base: u8, length: usize) -> Result<()> {
        if length <= i8::MAX as usize {
            self.put(&[base, length as u8])
        } else if length <= i16::MAX as usize {
            self.put(&[base + 1])?;
            self.put(&(length as i16).to_be_bytes())
        } else if length <= i32::MAX as usize {
            self.put(&[base + 2])?;
            self.put(&(length as i32).to_be_bytes())
        } else {
            Err(FormatError::TooLong {
                length: length as u64,
                max: i32::MAX as usize,
            })
        }
    }

    pub fn write_list_start(&mut self) -> Result<()> {
        self.put(&[tags::LIST])
    }

    pub fn write_list_end(&mut self) -> Result<()> {
        self.put(&[tags::END])
    }

    pub fn write_map_start(&mut self) -> Result<()> {
        self.put(&[tags::MAP])
    }

    pub fn write_map_end(&mut self) -> Result<()> {
        self.put(&[tags::END])
    }

    pub fn write_struct_start(&mut self, id: u8) -> Result<()> {
        self.put(&[tags::STRUCT, id])
    }

    pub fn write_struct_end(&mut self) -> Result<()> {
        self.put(&[tags::END])
    }
}

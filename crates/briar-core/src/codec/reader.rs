//! Streaming decoder with single-tag lookahead.

use std::io::{self, Read};

use super::consumer::{self, Consumer};
use super::{tags, ValueKind};
use crate::constants::UNIQUE_ID_LENGTH;
use crate::error::{FormatError, Result};

/// Maximum depth of nested lists, maps and structs.
pub const MAX_NESTING: usize = 64;

const SKIP_CHUNK: usize = 1024;

/// State of the one-byte lookahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookahead {
    /// Nothing has been peeked since the last consumed tag.
    Empty,
    /// The next tag, peeked but not yet consumed.
    Peeked(u8),
    /// The input is exhausted.
    Eof,
}

/// Decodes tagged values from a byte source.
///
/// `has_*` predicates peek at the next tag without consuming it and return
/// `false` at end of input. `read_*` and `skip_*` consume a whole value and
/// fail if the next value is of a different kind. Every variable-length read
/// takes a maximum that is checked before any buffer is sized.
pub struct Reader<R> {
    input: R,
    lookahead: Lookahead,
    consumers: Vec<Box<dyn Consumer>>,
}

impl<R: Read> Reader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            lookahead: Lookahead::Empty,
            consumers: Vec::new(),
        }
    }

    /// Attaches a consumer that will see every byte consumed from now on.
    pub fn add_consumer<C: Consumer>(&mut self, consumer: C) {
        self.consumers.push(Box::new(consumer));
    }

    /// Detaches the most recently attached consumer of type `C`.
    pub fn remove_consumer<C: Consumer>(&mut self) -> Option<C> {
        consumer::take(&mut self.consumers)
    }

    /// Returns true if the input is exhausted.
    pub fn eof(&mut self) -> Result<bool> {
        Ok(self.peek()?.is_none())
    }

    /// Classifies the next value without consuming it.
    pub fn peek_kind(&mut self) -> Result<Option<ValueKind>> {
        match self.peek()? {
            None => Ok(None),
            Some(tag) => ValueKind::from_tag(tag)
                .map(Some)
                .ok_or(FormatError::UnknownTag(tag)),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lookahead
    // ─────────────────────────────────────────────────────────────────────────

    fn peek(&mut self) -> Result<Option<u8>> {
        if self.lookahead == Lookahead::Empty {
            let mut byte = [0u8; 1];
            self.lookahead = loop {
                match self.input.read(&mut byte) {
                    Ok(0) => break Lookahead::Eof,
                    Ok(_) => break Lookahead::Peeked(byte[0]),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            };
        }
        Ok(match self.lookahead {
            Lookahead::Peeked(tag) => Some(tag),
            _ => None,
        })
    }

    fn has_tag(&mut self, accept: impl Fn(u8) -> bool) -> Result<bool> {
        Ok(matches!(self.peek()?, Some(tag) if accept(tag)))
    }

    /// Consumes the peeked tag if `accept` allows it.
    fn consume_tag(&mut self, expected: &'static str, accept: impl Fn(u8) -> bool) -> Result<u8> {
        let tag = self.peek()?.ok_or(FormatError::UnexpectedEof)?;
        if !accept(tag) {
            return Err(FormatError::UnexpectedTag {
                expected,
                found: tag,
            });
        }
        self.lookahead = Lookahead::Empty;
        consumer::feed(&mut self.consumers, &[tag])?;
        Ok(tag)
    }

    fn read_body(&mut self, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(self.lookahead, Lookahead::Empty);
        self.input.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => FormatError::UnexpectedEof,
            _ => FormatError::Io(e),
        })?;
        consumer::feed(&mut self.consumers, buf)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_body(&mut buf)?;
        Ok(buf)
    }

    fn skip_body(&mut self, mut length: usize) -> Result<()> {
        let mut chunk = [0u8; SKIP_CHUNK];
        while length > 0 {
            let n = length.min(SKIP_CHUNK);
            self.read_body(&mut chunk[..n])?;
            length -= n;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Null and booleans
    // ─────────────────────────────────────────────────────────────────────────

    pub fn has_null(&mut self) -> Result<bool> {
        self.has_tag(|t| t == tags::NULL)
    }

    pub fn read_null(&mut self) -> Result<()> {
        self.consume_tag("null", |t| t == tags::NULL).map(|_| ())
    }

    pub fn skip_null(&mut self) -> Result<()> {
        self.read_null()
    }

    pub fn has_boolean(&mut self) -> Result<bool> {
        self.has_tag(is_boolean)
    }

    pub fn read_boolean(&mut self) -> Result<bool> {
        Ok(self.consume_tag("boolean", is_boolean)? == tags::TRUE)
    }

    pub fn skip_boolean(&mut self) -> Result<()> {
        self.read_boolean().map(|_| ())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Numbers
    // ─────────────────────────────────────────────────────────────────────────

    pub fn has_integer(&mut self) -> Result<bool> {
        self.has_tag(is_integer)
    }

    /// Reads a signed integer, rejecting any encoding wider than necessary.
    pub fn read_integer(&mut self) -> Result<i64> {
        let tag = self.consume_tag("integer", is_integer)?;
        match tag {
            tags::INT_8 => Ok(i8::from_be_bytes(self.read_array()?) as i64),
            tags::INT_16 => {
                let value = i16::from_be_bytes(self.read_array()?);
                if i8::try_from(value).is_ok() {
                    return Err(FormatError::NonCanonical("int16 value fits in int8"));
                }
                Ok(value as i64)
            }
            tags::INT_32 => {
                let value = i32::from_be_bytes(self.read_array()?);
                if i16::try_from(value).is_ok() {
                    return Err(FormatError::NonCanonical("int32 value fits in int16"));
                }
                Ok(value as i64)
            }
            _ => {
                let value = i64::from_be_bytes(self.read_array()?);
                if i32::try_from(value).is_ok() {
                    return Err(FormatError::NonCanonical("int64 value fits in int32"));
                }
                Ok(value)
            }
        }
    }

    pub fn skip_integer(&mut self) -> Result<()> {
        self.read_integer().map(|_| ())
    }

    pub fn has_float(&mut self) -> Result<bool> {
        self.has_tag(|t| t == tags::FLOAT_64)
    }

    pub fn read_float(&mut self) -> Result<f64> {
        self.consume_tag("float", |t| t == tags::FLOAT_64)?;
        Ok(f64::from_bits(u64::from_be_bytes(self.read_array()?)))
    }

    pub fn skip_float(&mut self) -> Result<()> {
        self.read_float().map(|_| ())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Strings and raw bytes
    // ─────────────────────────────────────────────────────────────────────────

    pub fn has_string(&mut self) -> Result<bool> {
        self.has_tag(is_string)
    }

    pub fn read_string(&mut self, max: usize) -> Result<String> {
        let tag = self.consume_tag("string", is_string)?;
        let length = self.read_length(tag - tags::STRING_8, max)?;
        let mut buf = vec![0u8; length];
        self.read_body(&mut buf)?;
        String::from_utf8(buf).map_err(|_| FormatError::InvalidUtf8)
    }

    pub fn skip_string(&mut self, max: usize) -> Result<()> {
        let tag = self.consume_tag("string", is_string)?;
        let length = self.read_length(tag - tags::STRING_8, max)?;
        self.skip_body(length)
    }

    pub fn has_bytes(&mut self) -> Result<bool> {
        self.has_tag(is_raw)
    }

    pub fn read_bytes(&mut self, max: usize) -> Result<Vec<u8>> {
        let tag = self.consume_tag("raw bytes", is_raw)?;
        let length = self.read_length(tag - tags::RAW_8, max)?;
        let mut buf = vec![0u8; length];
        self.read_body(&mut buf)?;
        Ok(buf)
    }

    pub fn skip_bytes(&mut self, max: usize) -> Result<()> {
        let tag = self.consume_tag("raw bytes", is_raw)?;
        let length = self.read_length(tag - tags::RAW_8, max)?;
        self.skip_body(length)
    }

    /// Reads a raw value that must be exactly one identifier long.
    pub fn read_unique_id(&mut self) -> Result<[u8; UNIQUE_ID_LENGTH]> {
        let bytes = self.read_bytes(UNIQUE_ID_LENGTH)?;
        bytes
            .try_into()
            .map_err(|b: Vec<u8>| FormatError::InvalidField(format!("id of length {}", b.len())))
    }

    /// Reads a length prefix of width 8, 16 or 32 bits (`width` 0, 1, 2).
    fn read_length(&mut self, width: u8, max: usize) -> Result<usize> {
        let length = match width {
            0 => i8::from_be_bytes(self.read_array()?) as i64,
            1 => {
                let length = i16::from_be_bytes(self.read_array()?) as i64;
                if (0..=i8::MAX as i64).contains(&length) {
                    return Err(FormatError::NonCanonical("16-bit length fits in 8 bits"));
                }
                length
            }
            _ => {
                let length = i32::from_be_bytes(self.read_array()?) as i64;
                if (0..=i16::MAX as i64).contains(&length) {
                    return Err(FormatError::NonCanonical("32-bit length fits in 16 bits"));
                }
                length
            }
        };
        if length < 0 {
            return Err(FormatError::NegativeLength(length));
        }
        if length as u64 > max as u64 {
            return Err(FormatError::TooLong {
                length: length as u64,
                max,
            });
        }
        Ok(length as usize)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lists, maps and structs
    // ─────────────────────────────────────────────────────────────────────────

    pub fn has_list(&mut self) -> Result<bool> {
        self.has_tag(|t| t == tags::LIST)
    }

    pub fn read_list_start(&mut self) -> Result<()> {
        self.consume_tag("list", |t| t == tags::LIST).map(|_| ())
    }

    pub fn has_list_end(&mut self) -> Result<bool> {
        self.has_tag(|t| t == tags::END)
    }

    pub fn read_list_end(&mut self) -> Result<()> {
        self.read_end()
    }

    pub fn skip_list(&mut self) -> Result<()> {
        self.skip_list_at(0)
    }

    pub fn has_map(&mut self) -> Result<bool> {
        self.has_tag(|t| t == tags::MAP)
    }

    pub fn read_map_start(&mut self) -> Result<()> {
        self.consume_tag("map", |t| t == tags::MAP).map(|_| ())
    }

    pub fn has_map_end(&mut self) -> Result<bool> {
        self.has_tag(|t| t == tags::END)
    }

    pub fn read_map_end(&mut self) -> Result<()> {
        self.read_end()
    }

    pub fn skip_map(&mut self) -> Result<()> {
        self.skip_map_at(0)
    }

    pub fn has_struct(&mut self) -> Result<bool> {
        self.has_tag(|t| t == tags::STRUCT)
    }

    /// Reads a struct start and returns its id.
    pub fn read_struct_start_any(&mut self) -> Result<u8> {
        self.consume_tag("struct", |t| t == tags::STRUCT)?;
        let [id] = self.read_array()?;
        Ok(id)
    }

    /// Reads a struct start, failing unless its id is `expected`.
    pub fn read_struct_start(&mut self, expected: u8) -> Result<()> {
        let found = self.read_struct_start_any()?;
        if found != expected {
            return Err(FormatError::StructId { expected, found });
        }
        Ok(())
    }

    pub fn has_struct_end(&mut self) -> Result<bool> {
        self.has_tag(|t| t == tags::END)
    }

    pub fn read_struct_end(&mut self) -> Result<()> {
        self.read_end()
    }

    pub fn skip_struct(&mut self) -> Result<()> {
        self.skip_struct_at(0)
    }

    fn read_end(&mut self) -> Result<()> {
        self.consume_tag("end", |t| t == tags::END).map(|_| ())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Skipping
    // ─────────────────────────────────────────────────────────────────────────

    /// Consumes and discards the next value of any kind.
    pub fn skip_value(&mut self) -> Result<()> {
        self.skip_value_at(0)
    }

    fn skip_value_at(&mut self, depth: usize) -> Result<()> {
        match self.peek_kind()?.ok_or(FormatError::UnexpectedEof)? {
            ValueKind::Null => self.skip_null(),
            ValueKind::Boolean => self.skip_boolean(),
            ValueKind::Integer => self.skip_integer(),
            ValueKind::Float => self.skip_float(),
            ValueKind::String => self.skip_string(usize::MAX),
            ValueKind::Bytes => self.skip_bytes(usize::MAX),
            ValueKind::List => self.skip_list_at(depth),
            ValueKind::Map => self.skip_map_at(depth),
            ValueKind::Struct => self.skip_struct_at(depth),
            ValueKind::End => Err(FormatError::UnexpectedTag {
                expected: "value",
                found: tags::END,
            }),
        }
    }

    fn skip_list_at(&mut self, depth: usize) -> Result<()> {
        let depth = enter(depth)?;
        self.read_list_start()?;
        while !self.has_list_end()? {
            self.skip_value_at(depth)?;
        }
        self.read_list_end()
    }

    fn skip_map_at(&mut self, depth: usize) -> Result<()> {
        let depth = enter(depth)?;
        self.read_map_start()?;
        while !self.has_map_end()? {
            self.skip_value_at(depth)?;
            self.skip_value_at(depth)?;
        }
        self.read_map_end()
    }

    fn skip_struct_at(&mut self, depth: usize) -> Result<()> {
        let depth = enter(depth)?;
        self.read_struct_start_any()?;
        while !self.has_struct_end()? {
            self.skip_value_at(depth)?;
        }
        self.read_struct_end()
    }
}

/// Returns the depth inside a container opened at `depth`.
pub(crate) fn enter(depth: usize) -> Result<usize> {
    if depth >= MAX_NESTING {
        return Err(FormatError::NestingTooDeep(MAX_NESTING));
    }
    Ok(depth + 1)
}

fn is_boolean(tag: u8) -> bool {
    tag == tags::FALSE || tag == tags::TRUE
}

fn is_integer(tag: u8) -> bool {
    (tags::INT_8..=tags::INT_64).contains(&tag)
}

fn is_string(tag: u8) -> bool {
    (tags::STRING_8..=tags::STRING_32).contains(&tag)
}

fn is_raw(tag: u8) -> bool {
    (tags::RAW_8..=tags::RAW_32).contains(&tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CopyingConsumer;

    fn reader(input: &str) -> Reader<std::io::Cursor<Vec<u8>>> {
        let bytes = hex::decode(input.replace(' ', "")).unwrap();
        Reader::new(std::io::Cursor::new(bytes))
    }

    #[test]
    fn test_read_boolean() {
        let mut r = reader("0001");
        assert!(!r.read_boolean().unwrap());
        assert!(r.read_boolean().unwrap());
        assert!(r.eof().unwrap());
    }

    #[test]
    fn test_read_int8() {
        let mut r = reader("0200027f0280");
        assert_eq!(r.read_integer().unwrap(), 0);
        assert_eq!(r.read_integer().unwrap(), 127);
        assert_eq!(r.read_integer().unwrap(), -128);
    }

    #[test]
    fn test_read_int16() {
        let mut r = reader("030080 038000");
        assert_eq!(r.read_integer().unwrap(), 128);
        assert_eq!(r.read_integer().unwrap(), -32768);
        assert!(r.eof().unwrap());
    }

    #[test]
    fn test_int16_that_fits_in_int8_is_rejected() {
        let mut r = reader("03007f");
        assert!(matches!(r.read_integer(), Err(FormatError::NonCanonical(_))));
        let mut r = reader("03ff80");
        assert!(matches!(r.read_integer(), Err(FormatError::NonCanonical(_))));
    }

    #[test]
    fn test_read_int32_and_int64() {
        let mut r = reader("04000080000580000000000000000500000000ffffffff");
        assert_eq!(r.read_integer().unwrap(), 32768);
        assert_eq!(r.read_integer().unwrap(), i64::MIN);
        assert_eq!(r.read_integer().unwrap(), u32::MAX as i64);
    }

    #[test]
    fn test_wide_integers_that_fit_narrower_are_rejected() {
        let mut r = reader("0400007fff");
        assert!(matches!(r.read_integer(), Err(FormatError::NonCanonical(_))));
        let mut r = reader("05000000007fffffff");
        assert!(matches!(r.read_integer(), Err(FormatError::NonCanonical(_))));
    }

    #[test]
    fn test_read_float() {
        let mut r = reader("063ff0000000000000");
        assert_eq!(r.read_float().unwrap(), 1.0);
    }

    #[test]
    fn test_read_string() {
        let mut r = reader("0703666f6f0700");
        assert_eq!(r.read_string(3).unwrap(), "foo");
        assert_eq!(r.read_string(0).unwrap(), "");
    }

    #[test]
    fn test_read_string_over_max() {
        let mut r = reader("0703666f6f");
        assert!(matches!(
            r.read_string(2),
            Err(FormatError::TooLong { length: 3, max: 2 })
        ));
    }

    #[test]
    fn test_string_length_must_be_canonical() {
        let mut r = reader("080003666f6f");
        assert!(matches!(r.read_string(100), Err(FormatError::NonCanonical(_))));
    }

    #[test]
    fn test_negative_length_is_rejected() {
        let mut r = reader("07ff");
        assert!(matches!(r.read_string(100), Err(FormatError::NegativeLength(-1))));
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let mut r = reader("0701ff");
        assert!(matches!(r.read_string(10), Err(FormatError::InvalidUtf8)));
    }

    #[test]
    fn test_oversized_length_fails_before_reading_body() {
        // Claims 2^31 - 1 bytes but carries none: the length check must fire
        // before the missing body is noticed.
        let mut r = reader("0c7fffffff");
        assert!(matches!(r.read_bytes(1000), Err(FormatError::TooLong { .. })));
        let mut r = reader("097fffffff");
        assert!(matches!(r.skip_string(1000), Err(FormatError::TooLong { .. })));
    }

    #[test]
    fn test_read_bytes() {
        let mut r = reader("0a0301020300");
        assert_eq!(r.read_bytes(3).unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            r.read_bytes(3),
            Err(FormatError::UnexpectedTag { found: 0x00, .. })
        ));
    }

    #[test]
    fn test_truncated_body() {
        let mut r = reader("0a030102");
        assert!(matches!(r.read_bytes(3), Err(FormatError::UnexpectedEof)));
    }

    #[test]
    fn test_read_list() {
        let mut r = reader("0d 0201 0203 10 10");
        r.read_list_start().unwrap();
        let mut items = Vec::new();
        while !r.has_list_end().unwrap() {
            items.push(r.read_integer().unwrap());
        }
        r.read_list_end().unwrap();
        assert_eq!(items, vec![1, 3]);
        assert!(r.has_list_end().unwrap());
    }

    #[test]
    fn test_read_map() {
        let mut r = reader("0e0703666f6f021110");
        r.read_map_start().unwrap();
        assert!(!r.has_map_end().unwrap());
        assert_eq!(r.read_string(10).unwrap(), "foo");
        assert_eq!(r.read_integer().unwrap(), 17);
        assert!(r.has_map_end().unwrap());
        r.read_map_end().unwrap();
        assert!(r.eof().unwrap());
    }

    #[test]
    fn test_read_struct() {
        let mut r = reader("0f0711100f0810");
        assert!(r.has_struct().unwrap());
        r.read_struct_start(7).unwrap();
        r.read_null().unwrap();
        r.read_struct_end().unwrap();
        assert!(matches!(
            r.read_struct_start(7),
            Err(FormatError::StructId {
                expected: 7,
                found: 8
            })
        ));
    }

    #[test]
    fn test_has_predicates_are_false_at_eof() {
        let mut r = reader("");
        assert!(r.eof().unwrap());
        assert!(!r.has_list_end().unwrap());
        assert!(!r.has_integer().unwrap());
        assert!(matches!(r.read_null(), Err(FormatError::UnexpectedEof)));
    }

    #[test]
    fn test_peek_kind_rejects_unknown_tag() {
        let mut r = reader("ff");
        assert!(matches!(r.peek_kind(), Err(FormatError::UnknownTag(0xff))));
        assert!(!r.has_null().unwrap());
    }

    #[test]
    fn test_skip_nested_values() {
        // [ {"a": [1, null]}, struct 3 { true }, raw(2) ] then int 5
        let mut r = reader("0d 0e 070161 0d 0201 11 10 10 0f03 01 10 0a02abcd 10 0205");
        r.skip_list().unwrap();
        assert_eq!(r.read_integer().unwrap(), 5);
        assert!(r.eof().unwrap());
    }

    #[test]
    fn test_skip_rejects_deep_nesting() {
        let input = "0d".repeat(MAX_NESTING + 1) + &"10".repeat(MAX_NESTING + 1);
        let mut r = reader(&input);
        assert!(matches!(r.skip_list(), Err(FormatError::NestingTooDeep(_))));
    }

    #[test]
    fn test_consumers_see_every_byte_including_skipped() {
        let mut r = reader("0d 0201 0a02abcd 10 0207");
        r.add_consumer(CopyingConsumer::new());
        r.skip_list().unwrap();
        let copied: CopyingConsumer = r.remove_consumer().unwrap();
        assert_eq!(hex::encode(copied.into_bytes()), "0d02010a02abcd10");
        // Detached consumers see nothing further.
        assert_eq!(r.read_integer().unwrap(), 7);
    }

    #[test]
    fn test_read_unique_id_requires_exact_length() {
        let mut r = reader("0a0100");
        assert!(matches!(r.read_unique_id(), Err(FormatError::InvalidField(_))));
    }
}

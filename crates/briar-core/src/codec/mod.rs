//! Tag-prefixed binary encoding.
//!
//! Every value is preceded by a one-byte tag naming its kind. Integers and
//! length prefixes always use the narrowest width that can represent them;
//! a reader rejects any wider encoding, so each value has exactly one
//! serialized form. Lists, maps and structs are delimited by an `END` tag
//! rather than length-prefixed, which lets writers stream them.
//!
//! | tag | kind |
//! |---|---|
//! | `0x00` / `0x01` | false / true |
//! | `0x02`..`0x05` | 8, 16, 32, 64-bit signed integer |
//! | `0x06` | 64-bit float |
//! | `0x07`..`0x09` | UTF-8 string, 8/16/32-bit length |
//! | `0x0A`..`0x0C` | raw bytes, 8/16/32-bit length |
//! | `0x0D` / `0x0E` | list / map start |
//! | `0x0F` | struct start, followed by an id byte |
//! | `0x10` | end of list, map or struct |
//! | `0x11` | null |

pub mod consumer;
pub mod reader;
pub mod value;
pub mod writer;

pub use consumer::{Consumer, CopyingConsumer, CountingConsumer, DigestingConsumer};
pub use reader::Reader;
pub use value::Value;
pub use writer::Writer;

pub(crate) mod tags {
    pub const FALSE: u8 = 0x00;
    pub const TRUE: u8 = 0x01;
    pub const INT_8: u8 = 0x02;
    pub const INT_16: u8 = 0x03;
    pub const INT_32: u8 = 0x04;
    pub const INT_64: u8 = 0x05;
    pub const FLOAT_64: u8 = 0x06;
    pub const STRING_8: u8 = 0x07;
    pub const STRING_16: u8 = 0x08;
    pub const STRING_32: u8 = 0x09;
    pub const RAW_8: u8 = 0x0A;
    pub const RAW_16: u8 = 0x0B;
    pub const RAW_32: u8 = 0x0C;
    pub const LIST: u8 = 0x0D;
    pub const MAP: u8 = 0x0E;
    pub const STRUCT: u8 = 0x0F;
    pub const END: u8 = 0x10;
    pub const NULL: u8 = 0x11;
}

/// The kind of the next value, as classified from its tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Boolean,
    Integer,
    Float,
    String,
    Bytes,
    List,
    Map,
    Struct,
    End,
}

impl ValueKind {
    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        use tags::*;
        Some(match tag {
            FALSE | TRUE => ValueKind::Boolean,
            INT_8 | INT_16 | INT_32 | INT_64 => ValueKind::Integer,
            FLOAT_64 => ValueKind::Float,
            STRING_8 | STRING_16 | STRING_32 => ValueKind::String,
            RAW_8 | RAW_16 | RAW_32 => ValueKind::Bytes,
            LIST => ValueKind::List,
            MAP => ValueKind::Map,
            STRUCT => ValueKind::Struct,
            END => ValueKind::End,
            NULL => ValueKind::Null,
            _ => return None,
        })
    }
}

/// Number of bytes the narrowest integer encoding of `value` occupies,
/// including its tag.
pub fn integer_length(value: i64) -> usize {
    if i8::try_from(value).is_ok() {
        2
    } else if i16::try_from(value).is_ok() {
        3
    } else if i32::try_from(value).is_ok() {
        5
    } else {
        9
    }
}

/// Number of bytes the tag and length prefix of a `length`-byte string or raw
/// value occupy.
pub fn length_prefix_length(length: usize) -> usize {
    if length <= i8::MAX as usize {
        2
    } else if length <= i16::MAX as usize {
        3
    } else {
        5
    }
}

//! Passive byte consumers.
//!
//! A consumer attached to a [`Reader`](super::Reader) or
//! [`Writer`](super::Writer) sees every raw byte that passes through it, tags
//! and length prefixes included. Detaching it afterwards yields exactly the
//! byte range covered while it was attached, which is what signatures and
//! message ids are computed over.

use std::any::Any;

use crate::crypto::Blake3Hash;
use crate::error::{FormatError, Result};

/// Lets a boxed consumer be recovered as its concrete type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Receives every byte read or written while attached.
pub trait Consumer: AsAny + Send {
    fn write(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Copies every byte into a buffer.
#[derive(Debug, Default)]
pub struct CopyingConsumer {
    buf: Vec<u8>,
}

impl CopyingConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

impl Consumer for CopyingConsumer {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(bytes);
        Ok(())
    }
}

/// Counts bytes and fails once more than `max` have passed.
#[derive(Debug)]
pub struct CountingConsumer {
    count: u64,
    max: usize,
}

impl CountingConsumer {
    pub fn new(max: usize) -> Self {
        Self { count: 0, max }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Consumer for CountingConsumer {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.count += bytes.len() as u64;
        if self.count > self.max as u64 {
            return Err(FormatError::TooLong {
                length: self.count,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// Feeds every byte into a Blake3 hasher.
#[derive(Default)]
pub struct DigestingConsumer {
    hasher: blake3::Hasher,
}

impl DigestingConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finalize(&self) -> Blake3Hash {
        self.hasher.finalize().into()
    }
}

impl Consumer for DigestingConsumer {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.hasher.update(bytes);
        Ok(())
    }
}

/// Feeds `bytes` to every consumer in attachment order.
pub(crate) fn feed(consumers: &mut [Box<dyn Consumer>], bytes: &[u8]) -> Result<()> {
    for consumer in consumers.iter_mut() {
        consumer.write(bytes)?;
    }
    Ok(())
}

/// Detaches the most recently attached consumer of type `C`.
pub(crate) fn take<C: Consumer>(consumers: &mut Vec<Box<dyn Consumer>>) -> Option<C> {
    let index = consumers.iter().rposition(|c| (**c).as_any().is::<C>())?;
    consumers.remove(index).into_any().downcast::<C>().ok().map(|c| *c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting_consumer_rejects_over_max() {
        let mut c = CountingConsumer::new(4);
        c.write(&[1, 2, 3]).unwrap();
        c.write(&[4]).unwrap();
        assert!(matches!(
            c.write(&[5]),
            Err(FormatError::TooLong { length: 5, max: 4 })
        ));
    }

    #[test]
    fn test_take_finds_consumer_by_type() {
        let mut consumers: Vec<Box<dyn Consumer>> = vec![
            Box::new(CountingConsumer::new(100)),
            Box::new(CopyingConsumer::new()),
        ];
        feed(&mut consumers, b"abc").unwrap();

        let copied: CopyingConsumer = take(&mut consumers).unwrap();
        assert_eq!(copied.into_bytes(), b"abc");
        assert_eq!(consumers.len(), 1);
        assert!(take::<DigestingConsumer>(&mut consumers).is_none());
    }

    #[test]
    fn test_digesting_consumer_matches_hash() {
        let mut c = DigestingConsumer::new();
        c.write(b"hello ").unwrap();
        c.write(b"world").unwrap();
        assert_eq!(c.finalize(), Blake3Hash::hash(b"hello world"));
    }
}

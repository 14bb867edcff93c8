//! Messages, groups and authors.
//!
//! A message is serialized once, by its author, and from then on travels as
//! opaque bytes. Peers decode it to learn its group and to check its
//! signature, but never re-encode it: the id and the signature are both
//! computed over the bytes as received.

use std::io::Read;

use bytes::Bytes;

use crate::codec::{CopyingConsumer, CountingConsumer, Reader, Writer};
use crate::constants::{
    MAX_AUTHOR_NAME_LENGTH, MAX_BODY_LENGTH, MAX_GROUP_DESCRIPTOR_LENGTH, MAX_MESSAGE_LENGTH,
    MAX_PUBLIC_KEY_LENGTH, MAX_SIGNATURE_LENGTH,
};
use crate::crypto::{Blake3Hash, Keypair};
use crate::error::{FormatError, Result};
use crate::types::{ClientId, GroupId, MessageId};

/// Struct ids used inside message and subscription payloads.
pub mod struct_ids {
    pub const AUTHOR: u8 = 0;
    pub const GROUP: u8 = 1;
    pub const MESSAGE: u8 = 2;
}

/// A group: the unit of subscription and of message visibility.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Group {
    pub client_id: ClientId,
    pub descriptor: Bytes,
}

impl Group {
    pub fn new(client_id: ClientId, descriptor: impl Into<Bytes>) -> Self {
        Self {
            client_id,
            descriptor: descriptor.into(),
        }
    }

    /// Derives the group id from its client id and descriptor.
    pub fn id(&self) -> GroupId {
        GroupId(Blake3Hash::hash_parts(&[self.client_id.as_bytes(), &self.descriptor]).0)
    }

    pub fn write<W: std::io::Write>(&self, w: &mut Writer<W>) -> Result<()> {
        w.write_struct_start(struct_ids::GROUP)?;
        w.write_bytes(self.client_id.as_bytes())?;
        w.write_bytes(&self.descriptor)?;
        w.write_struct_end()
    }

    pub fn read<R: Read>(r: &mut Reader<R>) -> Result<Self> {
        r.read_struct_start(struct_ids::GROUP)?;
        let client_id = ClientId(r.read_unique_id()?);
        let descriptor = r.read_bytes(MAX_GROUP_DESCRIPTOR_LENGTH)?;
        r.read_struct_end()?;
        Ok(Self::new(client_id, descriptor))
    }
}

/// A pseudonymous author: a display name bound to a signing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub public_key: Bytes,
}

impl Author {
    pub fn new(name: impl Into<String>, public_key: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            public_key: public_key.into(),
        }
    }

    fn write<W: std::io::Write>(&self, w: &mut Writer<W>) -> Result<()> {
        w.write_struct_start(struct_ids::AUTHOR)?;
        w.write_string(&self.name)?;
        w.write_bytes(&self.public_key)?;
        w.write_struct_end()
    }

    fn read<R: Read>(r: &mut Reader<R>) -> Result<Self> {
        r.read_struct_start(struct_ids::AUTHOR)?;
        let name = r.read_string(MAX_AUTHOR_NAME_LENGTH)?;
        let public_key = r.read_bytes(MAX_PUBLIC_KEY_LENGTH)?;
        r.read_struct_end()?;
        Ok(Self::new(name, public_key))
    }
}

/// A decoded message whose signature has not been checked yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnverifiedMessage {
    /// The serialized message, exactly as received.
    pub raw: Bytes,
    pub parent: Option<MessageId>,
    pub group: GroupId,
    pub author: Option<Author>,
    pub timestamp: i64,
    pub body: Bytes,
    /// Length of the prefix of `raw` covered by the signature.
    pub signed_length: usize,
    pub signature: Option<Bytes>,
}

impl UnverifiedMessage {
    /// Decodes a serialized message.
    pub fn read(raw: Bytes) -> Result<Self> {
        let mut r = Reader::new(&raw[..]);
        r.add_consumer(CountingConsumer::new(MAX_MESSAGE_LENGTH));
        // Measures the signed range; detached before the signature.
        r.add_consumer(CountingConsumer::new(MAX_MESSAGE_LENGTH));

        r.read_struct_start(struct_ids::MESSAGE)?;
        let parent = if r.has_null()? {
            r.read_null()?;
            None
        } else {
            Some(MessageId(r.read_unique_id()?))
        };
        let group = GroupId(r.read_unique_id()?);
        let author = if r.has_null()? {
            r.read_null()?;
            None
        } else {
            Some(Author::read(&mut r)?)
        };
        let timestamp = r.read_integer()?;
        let body = r.read_bytes(MAX_BODY_LENGTH)?;

        let signed = r
            .remove_consumer::<CountingConsumer>()
            .map(|c| c.count() as usize)
            .unwrap_or_default();

        let signature = if r.has_null()? {
            r.read_null()?;
            None
        } else {
            Some(Bytes::from(r.read_bytes(MAX_SIGNATURE_LENGTH)?))
        };
        r.read_struct_end()?;
        if !r.eof()? {
            return Err(FormatError::TrailingData);
        }
        if author.is_some() != signature.is_some() {
            return Err(FormatError::InvalidField(
                "signature must be present exactly when an author is".into(),
            ));
        }

        Ok(Self {
            raw,
            parent,
            group,
            author,
            timestamp,
            body: Bytes::from(body),
            signed_length: signed,
            signature,
        })
    }

    /// The bytes the author signed.
    pub fn signed_bytes(&self) -> &[u8] {
        &self.raw[..self.signed_length]
    }

    pub fn id(&self) -> MessageId {
        MessageId(Blake3Hash::hash(&self.raw).0)
    }
}

/// A message whose signature, if any, has been verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub raw: Bytes,
    pub parent: Option<MessageId>,
    pub group: GroupId,
    pub author: Option<Author>,
    pub timestamp: i64,
    pub body: Bytes,
}

impl Message {
    /// Length of the serialized message.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Builds and signs messages.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageFactory;

impl MessageFactory {
    /// Creates an anonymous, unsigned message.
    pub fn create_anonymous(
        &self,
        parent: Option<MessageId>,
        group: &Group,
        timestamp: i64,
        body: &[u8],
    ) -> Result<Message> {
        self.create(parent, group, None, timestamp, body)
    }

    /// Creates a message signed by `keypair` on behalf of `name`.
    pub fn create_pseudonymous(
        &self,
        parent: Option<MessageId>,
        group: &Group,
        name: &str,
        keypair: &Keypair,
        timestamp: i64,
        body: &[u8],
    ) -> Result<Message> {
        let author = Author::new(name, keypair.public_key().as_bytes().to_vec());
        self.create(parent, group, Some((author, keypair)), timestamp, body)
    }

    fn create(
        &self,
        parent: Option<MessageId>,
        group: &Group,
        author: Option<(Author, &Keypair)>,
        timestamp: i64,
        body: &[u8],
    ) -> Result<Message> {
        check_length(name_len(&author), MAX_AUTHOR_NAME_LENGTH)?;
        check_length(body.len(), MAX_BODY_LENGTH)?;

        let mut w = Writer::new(Vec::new());
        w.add_consumer(CountingConsumer::new(MAX_MESSAGE_LENGTH));
        w.add_consumer(CopyingConsumer::new());
        w.write_struct_start(struct_ids::MESSAGE)?;
        match parent {
            Some(parent) => w.write_bytes(parent.as_bytes())?,
            None => w.write_null()?,
        }
        let group_id = group.id();
        w.write_bytes(group_id.as_bytes())?;
        match &author {
            Some((a, _)) => a.write(&mut w)?,
            None => w.write_null()?,
        }
        w.write_integer(timestamp)?;
        w.write_bytes(body)?;
        let signed = w
            .remove_consumer::<CopyingConsumer>()
            .map(CopyingConsumer::into_bytes)
            .unwrap_or_default();
        match &author {
            Some((_, keypair)) => {
                let signature = keypair.sign(&signed);
                w.write_bytes(signature.as_ref())?;
            }
            None => w.write_null()?,
        }
        w.write_struct_end()?;
        let raw = Bytes::from(w.close()?);

        Ok(Message {
            id: MessageId(Blake3Hash::hash(&raw).0),
            raw,
            parent,
            group: group_id,
            author: author.map(|(a, _)| a),
            timestamp,
            body: Bytes::copy_from_slice(body),
        })
    }
}

fn name_len(author: &Option<(Author, &Keypair)>) -> usize {
    author.as_ref().map(|(a, _)| a.name.len()).unwrap_or(0)
}

fn check_length(length: usize, max: usize) -> Result<()> {
    if length > max {
        return Err(FormatError::TooLong {
            length: length as u64,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> Group {
        Group::new(ClientId::from_bytes([1; 32]), &b"forum"[..])
    }

    #[test]
    fn test_group_id_is_deterministic() {
        let a = group();
        let b = Group::new(ClientId::from_bytes([1; 32]), &b"forum"[..]);
        let c = Group::new(ClientId::from_bytes([2; 32]), &b"forum"[..]);
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_anonymous_message_decodes() {
        let m = MessageFactory
            .create_anonymous(None, &group(), 1_000, b"hello")
            .unwrap();
        let u = UnverifiedMessage::read(m.raw.clone()).unwrap();
        assert_eq!(u.id(), m.id);
        assert_eq!(u.group, group().id());
        assert_eq!(u.body, Bytes::from_static(b"hello"));
        assert_eq!(u.timestamp, 1_000);
        assert!(u.author.is_none());
        assert!(u.signature.is_none());
    }

    #[test]
    fn test_signed_range_ends_after_body() {
        let keypair = Keypair::from_seed(&[9; 32]);
        let parent = MessageId::from_bytes([3; 32]);
        let m = MessageFactory
            .create_pseudonymous(Some(parent), &group(), "alice", &keypair, 5, b"body")
            .unwrap();
        let u = UnverifiedMessage::read(m.raw.clone()).unwrap();
        assert_eq!(u.parent, Some(parent));
        assert_eq!(u.author.as_ref().unwrap().name, "alice");
        // raw = signed range, raw8(64) signature, end
        assert_eq!(u.signed_length + 2 + 64 + 1, m.raw.len());
        let signature = crate::crypto::Ed25519Signature::from_slice(u.signature.as_ref().unwrap())
            .unwrap();
        keypair
            .public_key()
            .verify(u.signed_bytes(), &signature)
            .unwrap();
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let m = MessageFactory
            .create_anonymous(None, &group(), 0, b"x")
            .unwrap();
        let mut raw = m.raw.to_vec();
        raw.push(0x11);
        assert!(matches!(
            UnverifiedMessage::read(Bytes::from(raw)),
            Err(FormatError::TrailingData)
        ));
    }

    #[test]
    fn test_oversized_body_is_refused() {
        let body = vec![0u8; MAX_BODY_LENGTH + 1];
        assert!(matches!(
            MessageFactory.create_anonymous(None, &group(), 0, &body),
            Err(FormatError::TooLong { .. })
        ));
    }

    #[test]
    fn test_largest_message_fits_in_a_packet() {
        let keypair = Keypair::from_seed(&[1; 32]);
        let name = "n".repeat(MAX_AUTHOR_NAME_LENGTH);
        let body = vec![0u8; MAX_BODY_LENGTH];
        let m = MessageFactory
            .create_pseudonymous(
                Some(MessageId::from_bytes([0; 32])),
                &group(),
                &name,
                &keypair,
                i64::MAX,
                &body,
            )
            .unwrap();
        assert!(m.len() <= MAX_MESSAGE_LENGTH);
        UnverifiedMessage::read(m.raw).unwrap();
    }
}

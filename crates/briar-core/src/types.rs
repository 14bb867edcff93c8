//! Strong type definitions for Briar sync.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{MAX_TRANSPORT_ID_LENGTH, UNIQUE_ID_LENGTH};

macro_rules! unique_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub [u8; UNIQUE_ID_LENGTH]);

        impl $name {
            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; UNIQUE_ID_LENGTH]) -> Self {
                Self(bytes)
            }

            /// Get the raw bytes.
            pub const fn as_bytes(&self) -> &[u8; UNIQUE_ID_LENGTH] {
                &self.0
            }

            /// Convert to hex string.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse from hex string.
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let bytes = hex::decode(s)?;
                let arr: [u8; UNIQUE_ID_LENGTH] = bytes
                    .try_into()
                    .map_err(|_| hex::FromHexError::InvalidStringLength)?;
                Ok(Self(arr))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), &self.to_hex()[..16])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", &self.to_hex()[..16])
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; UNIQUE_ID_LENGTH]> for $name {
            fn from(bytes: [u8; UNIQUE_ID_LENGTH]) -> Self {
                Self(bytes)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = std::array::TryFromSliceError;

            fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
                let arr: [u8; UNIQUE_ID_LENGTH] = slice.try_into()?;
                Ok(Self(arr))
            }
        }
    };
}

unique_id! {
    /// A message identifier, computed as Blake3(serialized message).
    ///
    /// Two peers holding the same serialized bytes agree on the id, which is
    /// what lets Offers and Acks name messages without carrying them.
    MessageId
}

unique_id! {
    /// A group identifier, computed as Blake3(client id || descriptor).
    GroupId
}

unique_id! {
    /// Identifies the application client whose validator owns a group.
    ClientId
}

/// Local handle for a contact. Never sent on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct ContactId(pub u32);

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "contact-{}", self.0)
    }
}

/// Names a transport plugin, e.g. `"tcp"` or `"removable"`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransportId(String);

impl TransportId {
    /// Create a transport id, rejecting empty or over-long names.
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidTransportId> {
        let id = id.into();
        if id.is_empty() || id.len() > MAX_TRANSPORT_ID_LENGTH {
            return Err(InvalidTransportId(id.len()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TransportId {
    type Error = InvalidTransportId;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<TransportId> for String {
    fn from(id: TransportId) -> Self {
        id.0
    }
}

/// A transport id whose length is outside `1..=MAX_TRANSPORT_ID_LENGTH`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport id length {0} is out of range")]
pub struct InvalidTransportId(pub usize);

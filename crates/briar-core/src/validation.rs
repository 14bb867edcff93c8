//! Message verification: signature checks over the bytes as received.

use crate::crypto::{Ed25519PublicKey, Ed25519Signature};
use crate::error::VerificationError;
use crate::message::{Message, UnverifiedMessage};

/// Turns a decoded message into a trusted one.
///
/// Verification is CPU-bound and runs off the session's I/O path; an error
/// drops the one message and nothing else.
pub trait MessageVerifier: Send + Sync {
    fn verify(&self, message: UnverifiedMessage) -> Result<Message, VerificationError>;
}

/// Checks Ed25519 author signatures.
///
/// Anonymous messages carry no signature and pass once their structure is
/// sound.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignatureVerifier;

impl MessageVerifier for SignatureVerifier {
    fn verify(&self, message: UnverifiedMessage) -> Result<Message, VerificationError> {
        // 1. Timestamps are milliseconds since the epoch
        if message.timestamp < 0 {
            return Err(VerificationError::InvalidTimestamp(message.timestamp));
        }

        // 2. Signature present exactly when an author is
        match (&message.author, &message.signature) {
            (Some(author), Some(signature)) => {
                let key = Ed25519PublicKey::from_slice(&author.public_key)?;
                let signature = Ed25519Signature::from_slice(signature)?;
                key.verify(message.signed_bytes(), &signature)?;
            }
            (Some(_), None) => return Err(VerificationError::MissingSignature),
            (None, Some(_)) => return Err(VerificationError::UnexpectedSignature),
            (None, None) => {}
        }

        // 3. The id is the hash of the bytes as received
        let id = message.id();
        Ok(Message {
            id,
            raw: message.raw,
            parent: message.parent,
            group: message.group,
            author: message.author,
            timestamp: message.timestamp,
            body: message.body,
        })
    }
}

//! Protocol constants.
//!
//! Every size limit here is enforced as a hard decode failure.

/// Protocol version carried in the first byte of every packet header.
pub const PROTOCOL_VERSION: u8 = 0;

/// Packet header: version, type, payload length (u16 big-endian).
pub const PACKET_HEADER_LENGTH: usize = 4;

/// Maximum packet payload length.
pub const MAX_PAYLOAD_LENGTH: usize = 32 * 1024;

/// Maximum length of a framed packet.
pub const MAX_PACKET_LENGTH: usize = PACKET_HEADER_LENGTH + MAX_PAYLOAD_LENGTH;

/// Length of message, group and client identifiers.
pub const UNIQUE_ID_LENGTH: usize = 32;

/// Maximum number of groups in a subscription update.
pub const MAX_SUBSCRIPTIONS: usize = 200;

/// Maximum length of a group descriptor.
pub const MAX_GROUP_DESCRIPTOR_LENGTH: usize = 100;

/// Maximum length of a transport identifier.
pub const MAX_TRANSPORT_ID_LENGTH: usize = 64;

/// Maximum number of properties in a transport update.
pub const MAX_PROPERTIES_PER_TRANSPORT: usize = 100;

/// Maximum length of a transport property key or value.
pub const MAX_PROPERTY_LENGTH: usize = 100;

/// Maximum length of an author's name.
pub const MAX_AUTHOR_NAME_LENGTH: usize = 50;

/// Maximum length of a public key.
pub const MAX_PUBLIC_KEY_LENGTH: usize = 32;

/// Maximum length of a signature.
pub const MAX_SIGNATURE_LENGTH: usize = 64;

/// Maximum length of a serialized message (one packet payload).
pub const MAX_MESSAGE_LENGTH: usize = MAX_PACKET_LENGTH - PACKET_HEADER_LENGTH;

/// Maximum length of a message body. The remainder of a message's budget
/// covers its header fields.
pub const MAX_BODY_LENGTH: usize = MAX_MESSAGE_LENGTH - 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_length_fits_header_field() {
        assert!(MAX_PAYLOAD_LENGTH <= u16::MAX as usize);
    }

    #[test]
    fn test_largest_subscription_update_fits() {
        // Group struct: tag + id byte, raw32 client id, raw8 descriptor, end
        let group = 2 + (2 + UNIQUE_ID_LENGTH) + (2 + MAX_GROUP_DESCRIPTOR_LENGTH) + 1;
        // Outer list, inner list, int64 version
        let overhead = 2 + 2 + 9;
        assert!(MAX_SUBSCRIPTIONS * group + overhead <= MAX_PAYLOAD_LENGTH);
    }

    #[test]
    fn test_largest_transport_update_fits() {
        let property = 2 * (2 + MAX_PROPERTY_LENGTH);
        let id = 2 + MAX_TRANSPORT_ID_LENGTH;
        let overhead = 2 + 2 + 9;
        assert!(MAX_PROPERTIES_PER_TRANSPORT * property + id + overhead <= MAX_PAYLOAD_LENGTH);
    }
}

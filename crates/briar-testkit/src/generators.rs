//! Proptest generators for wire types.

use proptest::prelude::*;

use briar_core::{
    ClientId, Group, MessageId, Offer, Request, TransportProperties, TransportUpdate,
};
use briar_core::constants::{MAX_GROUP_DESCRIPTOR_LENGTH, MAX_PROPERTY_LENGTH};

use crate::fixtures::transport;

/// Generate a message id.
pub fn message_id() -> impl Strategy<Value = MessageId> {
    any::<[u8; 32]>().prop_map(MessageId::from_bytes)
}

/// Generate between 1 and `max` distinct message ids.
pub fn message_ids(max: usize) -> impl Strategy<Value = Vec<MessageId>> {
    prop::collection::btree_set(message_id(), 1..=max.max(1))
        .prop_map(|ids| ids.into_iter().collect())
}

pub fn offer(max: usize) -> impl Strategy<Value = Offer> {
    message_ids(max).prop_map(|message_ids| Offer { message_ids })
}

/// Generate an Offer together with a Request of matching length.
pub fn offer_and_request(max: usize) -> impl Strategy<Value = (Offer, Request)> {
    offer(max).prop_flat_map(|offer| {
        let n = offer.message_ids.len();
        prop::collection::vec(any::<bool>(), n)
            .prop_map(move |bits| (offer.clone(), Request::from_bits(bits)))
    })
}

pub fn group() -> impl Strategy<Value = Group> {
    (
        any::<[u8; 32]>(),
        prop::collection::vec(any::<u8>(), 0..=MAX_GROUP_DESCRIPTOR_LENGTH),
    )
        .prop_map(|(client, descriptor)| Group::new(ClientId::from_bytes(client), descriptor))
}

/// Generate a property map within the wire limits.
pub fn transport_properties() -> impl Strategy<Value = TransportProperties> {
    let text = format!("[a-z0-9.:]{{0,{}}}", MAX_PROPERTY_LENGTH.min(32));
    let key = proptest::string::string_regex(&text).expect("valid property pattern");
    let value = proptest::string::string_regex(&text).expect("valid property pattern");
    prop::collection::btree_map(key, value, 0..8)
}

pub fn transport_update() -> impl Strategy<Value = TransportUpdate> {
    (transport_properties(), 0..=i64::MAX as u64).prop_map(|(properties, version)| {
        TransportUpdate {
            transport_id: transport("tcp"),
            properties,
            version,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use briar_core::PacketPayload;

    proptest! {
        #[test]
        fn prop_generated_offers_encode(offer in offer(50)) {
            let payload = offer.encode_payload().unwrap();
            prop_assert_eq!(Offer::decode_payload(&payload).unwrap(), offer);
        }

        #[test]
        fn prop_request_matches_offer_length((offer, request) in offer_and_request(20)) {
            prop_assert_eq!(request.len(), offer.message_ids.len());
            let selection = request.select(&offer).unwrap();
            prop_assert_eq!(
                selection.requested.len() + selection.declined.len(),
                offer.message_ids.len()
            );
        }

        #[test]
        fn prop_transport_update_decodes_to_itself(update in transport_update()) {
            let payload = update.encode_payload().unwrap();
            prop_assert_eq!(TransportUpdate::decode_payload(&payload).unwrap(), update);
        }

        #[test]
        fn prop_group_id_is_stable(group in group()) {
            prop_assert_eq!(group.id(), group.clone().id());
        }
    }
}

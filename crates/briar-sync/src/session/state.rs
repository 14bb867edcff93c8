//! The duplex write side as a pure event-driven state machine.
//!
//! The read loop and the engine only ever talk to the write loop by sending
//! it [`SessionEvent`]s. [`DuplexState`] decides what each event means in the
//! current phase; the driver performs the resulting [`WriteAction`]s.

use briar_core::{MessageId, Offer, Request, Selection};

use crate::error::{Result, SyncError};

/// Where the write loop is in the Offer, Request, batch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePhase {
    /// Ask the store for an Offer.
    SendOffer,
    /// Our Offer is out; wait for the peer's Request.
    AwaitRequest,
    /// Write the messages the peer requested.
    SendBatches,
    /// Nothing to offer; wait for something to change.
    Idle,
    Closed,
}

/// Everything that can wake the write loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Messages from the peer reached the store and need acking.
    BatchReceived,
    ContactRemoved,
    /// New messages may be offerable.
    MessagesAdded,
    SubscriptionsChanged,
    TransportsChanged,
    OfferReceived(Offer),
    RequestReceived(Request),
}

/// Work the driver performs in response to an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteAction {
    SendAcks,
    SendUpdates,
    /// Ask the store which offered ids we lack and write the Request.
    AnswerOffer(Offer),
    /// Tell the store what the peer asked for and what it declined.
    RecordRequest(Selection),
    Close,
}

#[derive(Debug)]
pub struct DuplexState {
    phase: WritePhase,
    /// The Offer awaiting its Request.
    outstanding: Option<Offer>,
    /// Requested ids not yet sent, in offer order.
    requested: Vec<MessageId>,
}

impl Default for DuplexState {
    fn default() -> Self {
        Self::new()
    }
}

impl DuplexState {
    pub fn new() -> Self {
        Self {
            phase: WritePhase::SendOffer,
            outstanding: None,
            requested: Vec::new(),
        }
    }

    pub fn phase(&self) -> WritePhase {
        self.phase
    }

    /// True in the phases that block for an event.
    pub fn is_waiting(&self) -> bool {
        matches!(self.phase, WritePhase::AwaitRequest | WritePhase::Idle)
    }

    pub fn requested(&self) -> &[MessageId] {
        &self.requested
    }

    pub fn offer_written(&mut self, offer: Offer) {
        self.outstanding = Some(offer);
        self.phase = WritePhase::AwaitRequest;
    }

    pub fn nothing_to_offer(&mut self) {
        self.phase = WritePhase::Idle;
    }

    /// Records a batch round. `consumed` leading requested ids are done;
    /// once none remain, or the store produced nothing, the Request is
    /// discarded and the cycle restarts.
    pub fn batch_written(&mut self, consumed: usize, wrote_any: bool) {
        let consumed = consumed.min(self.requested.len());
        self.requested.drain(..consumed);
        if self.requested.is_empty() || !wrote_any {
            self.requested.clear();
            self.phase = WritePhase::SendOffer;
        }
    }

    /// Applies one event, returning the action it calls for.
    pub fn handle(&mut self, event: SessionEvent) -> Result<Option<WriteAction>> {
        if self.phase == WritePhase::Closed {
            return Ok(None);
        }
        Ok(match event {
            SessionEvent::BatchReceived => Some(WriteAction::SendAcks),
            SessionEvent::ContactRemoved => {
                self.phase = WritePhase::Closed;
                Some(WriteAction::Close)
            }
            SessionEvent::MessagesAdded => {
                if self.phase == WritePhase::Idle {
                    self.phase = WritePhase::SendOffer;
                }
                None
            }
            SessionEvent::SubscriptionsChanged | SessionEvent::TransportsChanged => {
                Some(WriteAction::SendUpdates)
            }
            SessionEvent::OfferReceived(offer) => Some(WriteAction::AnswerOffer(offer)),
            SessionEvent::RequestReceived(request) => {
                let offer = match (self.phase, self.outstanding.take()) {
                    (WritePhase::AwaitRequest, Some(offer)) => offer,
                    _ => {
                        return Err(SyncError::ProtocolViolation(
                            "request without an outstanding offer".into(),
                        ))
                    }
                };
                let selection = request.select(&offer)?;
                self.requested = selection.requested.clone();
                self.phase = WritePhase::SendBatches;
                Some(WriteAction::RecordRequest(selection))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(n: u8) -> Offer {
        Offer {
            message_ids: (0..n).map(|i| MessageId::from_bytes([i; 32])).collect(),
        }
    }

    #[test]
    fn test_offer_request_batch_cycle() {
        let mut state = DuplexState::new();
        assert_eq!(state.phase(), WritePhase::SendOffer);

        let offered = offer(3);
        state.offer_written(offered.clone());
        assert!(state.is_waiting());

        let action = state
            .handle(SessionEvent::RequestReceived(Request::from_bits([
                true, false, true,
            ])))
            .unwrap();
        let expected = Selection {
            requested: vec![offered.message_ids[0], offered.message_ids[2]],
            declined: vec![offered.message_ids[1]],
        };
        assert_eq!(action, Some(WriteAction::RecordRequest(expected.clone())));
        assert_eq!(state.phase(), WritePhase::SendBatches);
        assert_eq!(state.requested(), &expected.requested[..]);

        state.batch_written(1, true);
        assert_eq!(state.phase(), WritePhase::SendBatches);
        state.batch_written(1, true);
        assert_eq!(state.phase(), WritePhase::SendOffer);

        state.nothing_to_offer();
        assert_eq!(state.phase(), WritePhase::Idle);
        assert_eq!(state.handle(SessionEvent::MessagesAdded).unwrap(), None);
        assert_eq!(state.phase(), WritePhase::SendOffer);
    }

    #[test]
    fn test_request_without_offer_is_violation() {
        let mut state = DuplexState::new();
        state.nothing_to_offer();
        let result = state.handle(SessionEvent::RequestReceived(Request::from_bits([true])));
        assert!(matches!(result, Err(SyncError::ProtocolViolation(_))));
    }

    #[test]
    fn test_second_request_is_violation() {
        let mut state = DuplexState::new();
        state.offer_written(offer(1));
        state
            .handle(SessionEvent::RequestReceived(Request::from_bits([true])))
            .unwrap();
        let result = state.handle(SessionEvent::RequestReceived(Request::from_bits([true])));
        assert!(matches!(result, Err(SyncError::ProtocolViolation(_))));
    }

    #[test]
    fn test_request_longer_than_offer_is_violation() {
        let mut state = DuplexState::new();
        state.offer_written(offer(2));
        let result = state.handle(SessionEvent::RequestReceived(Request::from_bits([
            true, true, true,
        ])));
        assert!(matches!(result, Err(SyncError::ProtocolViolation(_))));
    }

    #[test]
    fn test_empty_batch_abandons_request() {
        let mut state = DuplexState::new();
        state.offer_written(offer(4));
        state
            .handle(SessionEvent::RequestReceived(Request::from_bits([true; 4])))
            .unwrap();
        state.batch_written(0, false);
        assert_eq!(state.phase(), WritePhase::SendOffer);
        assert!(state.requested().is_empty());
    }

    #[test]
    fn test_events_map_to_actions() {
        let mut state = DuplexState::new();
        state.nothing_to_offer();
        assert_eq!(
            state.handle(SessionEvent::BatchReceived).unwrap(),
            Some(WriteAction::SendAcks)
        );
        assert_eq!(
            state.handle(SessionEvent::TransportsChanged).unwrap(),
            Some(WriteAction::SendUpdates)
        );
        assert_eq!(
            state.handle(SessionEvent::OfferReceived(offer(1))).unwrap(),
            Some(WriteAction::AnswerOffer(offer(1)))
        );
        assert_eq!(
            state.handle(SessionEvent::ContactRemoved).unwrap(),
            Some(WriteAction::Close)
        );
        assert_eq!(state.phase(), WritePhase::Closed);
        assert_eq!(state.handle(SessionEvent::BatchReceived).unwrap(), None);
    }
}

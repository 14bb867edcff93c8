//! # Briar Store
//!
//! The store contract the sync engine consults, and an in-memory
//! implementation of it.
//!
//! ## Overview
//!
//! Sessions never decide what to send on their own: they ask the store to
//! generate the next Ack, Offer, batch or update for a contact, and hand it
//! everything they receive. The [`SyncStore`] trait is that narrow contract;
//! [`MemoryStore`] implements it for tests and embedding.
//!
//! ## Key Types
//!
//! - [`SyncStore`] - The async generate/receive contract
//! - [`MemoryStore`] - In-memory reference implementation
//! - [`ReceiveResult`] - Whether a received message was new
//! - [`Batch`] - Messages produced for an outstanding Request
//!
//! ## Design Notes
//!
//! - **Idempotent receives**: duplicate messages and stale updates are no-ops
//! - **Versioned updates**: subscription, transport and retention state is
//!   versioned per contact; only newer versions apply
//! - **Retransmission**: anything offered or sent is held back until the
//!   transport has had time to deliver an ack

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use traits::{Batch, ReceiveResult, SyncStore};

//! # Briar Testkit
//!
//! Testing utilities for the Briar sync engine.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Framed packets with their exact wire bytes
//! - **Generators**: Proptest strategies for ids, offers, requests, groups and transport updates
//! - **Fixtures**: Peers with keypairs and stores, shared groups, stream contexts
//! - **Faulty I/O**: Readers and writers that fail mid-stream
//!
//! ## Golden Vectors
//!
//! ```rust
//! use briar_testkit::vectors::{all_vectors, encode_frame};
//!
//! for vector in all_vectors() {
//!     let frame = encode_frame(&vector.packet).unwrap();
//!     assert_eq!(hex::encode(frame), vector.frame_hex, "{}", vector.name);
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use briar_testkit::fixtures::{forum, TestPeer};
//! use briar_core::ContactId;
//!
//! let alice = TestPeer::new("alice", 1);
//! alice.share(&forum(), &[ContactId(2)]);
//! let message = alice.post(&forum(), 1_000, b"hello");
//! assert!(alice.store.has_message(&message.id));
//! ```

pub mod fixtures;
pub mod generators;
pub mod io;
pub mod vectors;

pub use fixtures::{context, forum, group, transport, TestPeer, TEST_SECRET};
pub use io::{AfterData, FailingWriter, FaultyReader, FaultyStream};
pub use vectors::{all_vectors, decode_frame, encode_frame, WireVector};

/// Install a test-writer tracing subscriber. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();
}

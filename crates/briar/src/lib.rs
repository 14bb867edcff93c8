//! # Briar
//!
//! The composition root of the Briar sync engine.
//!
//! ## Overview
//!
//! The engine wires a [`SyncStore`](store::SyncStore), a message verifier
//! and a connection registry into the shared session services, holds the
//! static transport registration list, and spawns a session for every
//! stream a transport hands it.
//!
//! - **Duplex** transports get a [`DuplexSession`](sync::DuplexSession)
//!   that lives until either side closes the stream.
//! - **Simplex** transports get a one-shot outgoing or incoming session.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use briar::{EngineBuilder, EngineConfig, LocalEvent};
//! use briar::core::{ContactId, SignatureVerifier};
//! use briar::store::MemoryStore;
//! use briar::sync::{InMemoryRegistry, StreamContext};
//!
//! async fn example(stream: tokio::io::DuplexStream) -> anyhow::Result<()> {
//!     let config = EngineConfig::load("briar.json")?;
//!     let engine = EngineBuilder::new(
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(SignatureVerifier),
//!         Arc::new(InMemoryRegistry::new()),
//!     )
//!     .config(config)
//!     .build();
//!
//!     let ctx = StreamContext::new(ContactId(1), "tcp".to_string().try_into()?, [0; 32]);
//!     let session = engine.start_duplex(ctx, stream)?;
//!
//!     engine.notify(LocalEvent::ContactRemoved(ContactId(1)));
//!     let report = session.join().await?;
//!     println!("sent {} messages", report.messages_sent);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `briar::core` - Identifiers, codec, messages and packets
//! - `briar::store` - The store contract and the in-memory store
//! - `briar::sync` - Sessions, framing, queue, registry

pub mod config;
pub mod engine;
pub mod error;

pub use briar_core as core;
pub use briar_store as store;
pub use briar_sync as sync;

pub use config::{EngineConfig, TransportDescriptor, TransportKind};
pub use engine::{EngineBuilder, LocalEvent, SessionHandle, SyncEngine};
pub use error::{EngineError, Result};

pub use briar_sync::{SessionReport, StreamContext};

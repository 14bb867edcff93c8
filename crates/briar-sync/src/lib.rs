//! # Briar Sync
//!
//! Sync sessions for the Briar sync engine.
//!
//! ## Overview
//!
//! A session moves messages and versioned metadata between the local store
//! and one contact over one connected stream. Duplex sessions reconcile
//! through Offer, Request and batch; simplex sessions push or apply one
//! burst with no back-channel.
//!
//! ## Scheduling
//!
//! - **Store access** is strictly sequential through [`StoreQueue`].
//! - **Verification** runs on a bounded [`VerificationPool`].
//! - **Per-session I/O** runs in the session's own task; duplex sessions
//!   drive their read and write loops concurrently.
//!
//! ## Message Flow
//!
//! ```text
//! Node A                              Node B
//!   |-------- updates, acks ---------->|
//!   |<------- updates, acks -----------|
//!   |-------- Offer [x, y, z] -------->|
//!   |<------- Request 101 -------------|   (B already holds y)
//!   |-------- Message x -------------->|
//!   |-------- Message z -------------->|
//!   |<------- Ack [y, x, z] -----------|
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod packet_reader;
pub mod packet_writer;
pub mod queue;
pub mod registry;
pub mod session;
pub mod verification;

pub use config::SyncConfig;
pub use context::{SessionSecret, StreamContext, SECRET_LENGTH};
pub use error::{Result, SyncError};
pub use packet_reader::PacketReader;
pub use packet_writer::PacketWriter;
pub use queue::StoreQueue;
pub use registry::{ConnectionRegistry, InMemoryRegistry};
pub use session::{
    DuplexSession, DuplexState, SessionEvent, SessionEvents, SessionReport, SimplexIncoming,
    SimplexOutgoing, SyncServices, WriteAction, WritePhase,
};
pub use verification::VerificationPool;

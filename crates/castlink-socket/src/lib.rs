//! Connection lifecycle for the cast device socket.
//!
//! [`SocketService`] owns at most one live session over a byte-stream
//! transport. A session bundles the write half of the stream, a background
//! read pump that decodes frames and hands them to a [`FrameHandler`] in
//! wire order, and a cancellation scope shared with the connection and
//! heartbeat channels so that everything started for the session stops
//! together.
//!
//! Writes are serialized against the socket. Connect and disconnect are
//! serialized against each other, and a write never reaches a transport that
//! is being torn down.

pub mod channels;
pub mod config;
pub mod error;
pub mod handler;
pub mod pump;
pub mod service;
pub mod session;

pub use channels::{IntervalHeartbeat, NoopChannel, StaticHandshake};
pub use config::SocketConfig;
pub use error::{BoxError, Result, SocketError};
pub use handler::{ConnectionChannel, FrameHandler, HeartbeatChannel};
pub use pump::PumpExit;
pub use service::{SocketService, SocketWriter};
pub use session::ConnectionState;

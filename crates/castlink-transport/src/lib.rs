//! Byte-stream transport for cast device sockets.
//!
//! This is the lowest layer of castlink. A [`Connector`] opens a reliable,
//! ordered byte stream to `(host, port)`; everything above it (framing,
//! session lifecycle) is transport-agnostic.
//!
//! [`TcpConnector`] is the production connector. Tests substitute in-memory
//! streams by implementing [`Connector`] over `tokio::io::duplex`.

pub mod error;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use tcp::{TcpConnector, DEFAULT_CAST_PORT};
pub use traits::Connector;

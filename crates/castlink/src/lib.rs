//! Cast device socket client.
//!
//! castlink talks to cast-capable media devices over their length-prefixed
//! TCP device socket. It owns the connection lifecycle (one session at a
//! time, serialized writes, a background read pump) and leaves message
//! semantics to the caller.
//!
//! # Crate Structure
//!
//! - [`transport`]: Byte-stream transport contract and TCP connector
//! - [`frame`]: Big-endian length-prefixed framing
//! - [`socket`]: Session lifecycle, read pump and write serialization
//! - [`config`]: Plugin settings store and device table

pub mod config;

/// Re-export transport types.
pub mod transport {
    pub use castlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use castlink_frame::*;
}

/// Re-export socket types.
pub mod socket {
    pub use castlink_socket::*;
}

pub use castlink_socket::{SocketError, SocketService};
pub use config::{CastDevice, ConfigError, PluginConfig, SettingsStore};

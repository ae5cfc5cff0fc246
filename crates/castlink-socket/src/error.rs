use std::time::Duration;

/// Boxed error returned by frame handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur in socket service operations.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] castlink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] castlink_frame::FrameError),

    /// A session is already established.
    #[error("already connected to {addr}")]
    AlreadyConnected { addr: String },

    /// No session is established, or it is being torn down.
    #[error("connection closed")]
    ConnectionClosed,

    /// The caller's cancellation token fired before the operation completed.
    #[error("operation cancelled")]
    Cancelled,

    /// Connecting did not complete in time.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// The frame handler rejected a payload.
    #[error("frame handler failed: {0}")]
    Handler(#[source] BoxError),

    /// The read pump task panicked.
    #[error("read task failed: {0}")]
    ReadTask(#[from] tokio::task::JoinError),
}

impl SocketError {
    /// Returns true for framing violations reported by the peer's byte stream.
    pub fn is_protocol(&self) -> bool {
        matches!(self, SocketError::Frame(err) if err.is_protocol())
    }
}

pub type Result<T> = std::result::Result<T, SocketError>;

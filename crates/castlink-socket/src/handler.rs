use std::future::Future;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::BoxError;

/// Receives decoded frame payloads from the read pump.
///
/// Called once per frame, in wire order, never concurrently. `is_binary` is
/// always `true` for the device socket. `token` is the session scope; long
/// running handlers should stop when it fires.
///
/// Handlers must not disconnect the service they are attached to from
/// inside `on_frame`: disconnect waits for the pump, and the pump waits for
/// the handler.
pub trait FrameHandler: Send + Sync + 'static {
    /// Handle one complete payload.
    fn on_frame(
        &self,
        payload: Bytes,
        is_binary: bool,
        token: CancellationToken,
    ) -> impl Future<Output = Result<(), BoxError>> + Send;
}

impl<F, Fut> FrameHandler for F
where
    F: Fn(Bytes, bool, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send,
{
    fn on_frame(
        &self,
        payload: Bytes,
        is_binary: bool,
        token: CancellationToken,
    ) -> impl Future<Output = Result<(), BoxError>> + Send {
        self(payload, is_binary, token)
    }
}

/// Connection-establishment collaborator, started once per session.
pub trait ConnectionChannel: Send + Sync {
    /// Begin the handshake for a freshly opened session.
    ///
    /// Must return promptly; long work belongs on a task that stops when
    /// `scope` is cancelled.
    fn open_connection(&self, scope: CancellationToken);
}

/// Keep-alive collaborator, started once per session.
pub trait HeartbeatChannel: Send + Sync {
    /// Begin periodic keep-alive traffic until `scope` is cancelled.
    fn start_heartbeat(&self, scope: CancellationToken);
}

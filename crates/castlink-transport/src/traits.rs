use std::future::Future;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// Opens byte streams to a remote endpoint.
///
/// The returned stream must deliver bytes reliably and in order. Reads may
/// return fewer bytes than requested; callers loop until they have what they
/// need. Closing is done by shutting down the write side and dropping the
/// stream.
///
/// Cancellation is by dropping the returned future; implementations must not
/// leave a half-open connection behind when that happens.
pub trait Connector: Send + Sync + 'static {
    /// The connected stream type.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Open a stream to `host:port`.
    fn connect(&self, host: &str, port: u16)
        -> impl Future<Output = Result<Self::Stream>> + Send;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;
}

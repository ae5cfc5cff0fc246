use std::io::ErrorKind;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::codec::{decode_frame, incomplete, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `AsyncRead` stream.
///
/// Handles partial reads internally; callers always get complete payloads.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: AsyncRead + Unpin> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame payload.
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when the stream ends on a
    /// frame boundary, `Err(FrameError::Incomplete { .. })` when it ends inside
    /// one, and `Err(FrameError::Cancelled)` once `token` fires. Cancellation
    /// never loses buffered bytes; a later call resumes where this one stopped.
    pub async fn read_frame(&mut self, token: &CancellationToken) -> Result<Bytes> {
        loop {
            if let Some(payload) = decode_frame(&mut self.buf, self.config.max_payload_size)? {
                trace!(len = payload.len(), "decoded frame");
                return Ok(payload);
            }

            if self.buf.capacity() - self.buf.len() < READ_CHUNK_SIZE {
                self.buf.reserve(READ_CHUNK_SIZE);
            }

            let read = tokio::select! {
                biased;
                () = token.cancelled() => return Err(FrameError::Cancelled),
                read = self.inner.read_buf(&mut self.buf) => read,
            };

            match read {
                Ok(0) if self.buf.is_empty() => return Err(FrameError::ConnectionClosed),
                Ok(0) => return Err(incomplete(&self.buf)),
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Number of bytes received but not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

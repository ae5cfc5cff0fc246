use std::sync::{Arc, Weak};

use bytes::BytesMut;
use castlink_frame::{encode_frame, FrameError, FrameReader};
use castlink_transport::{Connector, TcpConnector, TransportError};
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::SocketConfig;
use crate::error::{Result, SocketError};
use crate::handler::{ConnectionChannel, FrameHandler, HeartbeatChannel};
use crate::pump::run_read_pump;
use crate::session::{ConnectionState, Session};

/// Write side of a live session, guarded by the write lock.
struct SessionWriter<S> {
    half: WriteHalf<S>,
    scope: CancellationToken,
}

struct Inner<C: Connector> {
    connector: C,
    config: SocketConfig,
    /// Connect/disconnect lock; holds the session.
    lifecycle: Mutex<Option<Session>>,
    /// Write lock; `None` whenever no session exists.
    writer: Mutex<Option<SessionWriter<C::Stream>>>,
}

/// Client socket to a single cast device.
///
/// Cloning is cheap and every clone drives the same session. Dropping the
/// last clone stops a live session's read pump and releases the transport
/// without waiting; call [`SocketService::shutdown`] to tear down gracefully.
pub struct SocketService<C: Connector = TcpConnector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for SocketService<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl SocketService<TcpConnector> {
    /// Create a TCP socket service with default configuration.
    pub fn new() -> Self {
        Self::with_connector(TcpConnector::new(), SocketConfig::default())
    }
}

impl Default for SocketService<TcpConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> SocketService<C> {
    /// Create a socket service over an explicit connector.
    pub fn with_connector(connector: C, config: SocketConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector,
                config,
                lifecycle: Mutex::new(None),
                writer: Mutex::new(None),
            }),
        }
    }

    /// Service configuration.
    pub fn config(&self) -> &SocketConfig {
        &self.inner.config
    }

    /// Open a session to `host:port`.
    ///
    /// On success the read pump is running in the background, feeding
    /// `handler`, and both channels have been started with the session scope.
    /// The scope fires when `token` is cancelled or the session is
    /// disconnected, whichever comes first.
    ///
    /// Fails with [`SocketError::AlreadyConnected`] if a session exists and
    /// with [`SocketError::Cancelled`] if `token` fires first. A failed
    /// connect leaves no session behind.
    pub async fn connect<H: FrameHandler>(
        &self,
        host: &str,
        port: u16,
        connection: &dyn ConnectionChannel,
        heartbeat: &dyn HeartbeatChannel,
        handler: H,
        token: &CancellationToken,
    ) -> Result<()> {
        let mut slot = lock_or_cancel(&self.inner.lifecycle, token).await?;
        if let Some(session) = slot.as_ref() {
            return Err(SocketError::AlreadyConnected {
                addr: session.addr.clone(),
            });
        }

        let addr = format!("{host}:{port}");
        let stream = self.open(host, port, token).await?;

        let scope = token.child_token();
        let (read_half, write_half) = tokio::io::split(stream);
        let mut write_slot = self.inner.writer.lock().await;

        let reader = FrameReader::with_config(read_half, self.inner.config.frame);
        let pump = tokio::spawn(
            run_read_pump(reader, handler, scope.clone())
                .instrument(info_span!("read_pump", %addr)),
        );

        // Writes stay closed until the session is in place.
        *slot = Some(Session {
            addr: addr.clone(),
            scope: scope.clone(),
            pump,
        });
        *write_slot = Some(SessionWriter {
            half: write_half,
            scope: scope.clone(),
        });
        drop(write_slot);

        connection.open_connection(scope.clone());
        heartbeat.start_heartbeat(scope);

        info!(%addr, transport = self.inner.connector.transport_name(), "session established");
        Ok(())
    }

    async fn open(&self, host: &str, port: u16, token: &CancellationToken) -> Result<C::Stream> {
        let connect = async {
            let pending = self.inner.connector.connect(host, port);
            match self.inner.config.connect_timeout {
                Some(limit) => tokio::time::timeout(limit, pending)
                    .await
                    .map_err(|_| SocketError::Timeout(limit))?
                    .map_err(SocketError::from),
                None => pending.await.map_err(SocketError::from),
            }
        };

        tokio::select! {
            biased;
            () = token.cancelled() => {
                debug!(host, port, "connect cancelled");
                Err(SocketError::Cancelled)
            }
            result = connect => result,
        }
    }

    /// Tear down the current session, if any.
    ///
    /// Stops the session scope, closes the transport and waits for the read
    /// pump. A pump that stopped because of cancellation or a closed transport
    /// is a clean exit; any other pump failure is returned here. The session
    /// is gone when this returns, error or not.
    pub async fn disconnect(&self, token: &CancellationToken) -> Result<()> {
        let mut slot = lock_or_cancel(&self.inner.lifecycle, token).await?;
        let Some(session) = slot.take() else {
            return Ok(());
        };
        let addr = session.addr.clone();

        session.stop();
        let closed = self.close_writer().await;
        let pumped = session.join().await;

        match (&pumped, &closed) {
            (Err(err), _) => warn!(%addr, error = %err, "session ended with read failure"),
            (Ok(_), Err(err)) => warn!(%addr, error = %err, "transport close failed"),
            (Ok(exit), Ok(())) => info!(%addr, ?exit, "session closed"),
        }
        pumped.and(closed)
    }

    /// Take the write half out of service and shut it down.
    async fn close_writer(&self) -> Result<()> {
        // In-flight writes observe the cancelled scope and release the lock.
        let writer = self.inner.writer.lock().await.take();
        let Some(mut writer) = writer else {
            return Ok(());
        };
        match writer.half.shutdown().await {
            Ok(()) => Ok(()),
            Err(err) => {
                let err = TransportError::Io(err);
                if err.is_closed() {
                    Ok(())
                } else {
                    Err(err.into())
                }
            }
        }
    }

    /// Write raw bytes to the device, unframed.
    ///
    /// Concurrent writes never interleave; they go out in lock-acquisition
    /// order. Fails with [`SocketError::ConnectionClosed`] when no session
    /// exists or the session is being torn down.
    pub async fn write(&self, bytes: &[u8], token: &CancellationToken) -> Result<()> {
        self.inner.write(bytes, token).await
    }

    /// Encode `payload` as one frame and write it.
    pub async fn send_frame(&self, payload: &[u8], token: &CancellationToken) -> Result<()> {
        self.inner.send_frame(payload, token).await
    }

    /// A write-only handle that does not keep the service alive.
    pub fn writer(&self) -> SocketWriter<C> {
        SocketWriter {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        match self.inner.lifecycle.try_lock() {
            Ok(slot) => slot
                .as_ref()
                .map_or(ConnectionState::Disconnected, Session::state),
            Err(_) => ConnectionState::Transitioning,
        }
    }

    /// Returns true while a session exists and its read pump is running.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Gracefully release the service. Safe to call any number of times.
    pub async fn shutdown(&self) -> Result<()> {
        self.disconnect(&CancellationToken::new()).await
    }
}

impl<C: Connector> Inner<C> {
    async fn write(&self, bytes: &[u8], token: &CancellationToken) -> Result<()> {
        let mut guard = lock_or_cancel(&self.writer, token).await?;
        let Some(writer) = guard.as_mut() else {
            return Err(SocketError::ConnectionClosed);
        };
        if writer.scope.is_cancelled() {
            return Err(SocketError::ConnectionClosed);
        }

        let scope = writer.scope.clone();
        let outcome = tokio::select! {
            biased;
            () = scope.cancelled() => Err(SocketError::ConnectionClosed),
            () = token.cancelled() => Err(SocketError::Cancelled),
            written = write_all_flush(&mut writer.half, bytes) => written,
        };

        if matches!(outcome, Err(SocketError::Cancelled)) {
            // The stream may now hold a partial write; nothing else may follow it,
            // so the session ends here and waits for its owner to disconnect.
            warn!(len = bytes.len(), "write cancelled mid-flight; ending session");
            scope.cancel();
            guard.take();
        } else if outcome.is_ok() {
            debug!(len = bytes.len(), "wrote bytes");
        }
        outcome
    }

    async fn send_frame(&self, payload: &[u8], token: &CancellationToken) -> Result<()> {
        let max = self.config.frame.max_payload_size;
        if payload.len() > max {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max,
            }
            .into());
        }
        let mut buf = BytesMut::new();
        encode_frame(payload, &mut buf)?;
        self.write(&buf, token).await
    }
}

impl<C: Connector> Drop for Inner<C> {
    fn drop(&mut self) {
        if let Some(session) = self.lifecycle.get_mut().take() {
            debug!(addr = %session.addr, "dropping live session");
            session.abort();
        }
    }
}

/// Write-only handle to a [`SocketService`].
///
/// Holds the service weakly so that collaborators such as heartbeats do not
/// keep it alive; writes after the service is dropped fail with
/// [`SocketError::ConnectionClosed`].
pub struct SocketWriter<C: Connector = TcpConnector> {
    inner: Weak<Inner<C>>,
}

impl<C: Connector> Clone for SocketWriter<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<C: Connector> SocketWriter<C> {
    /// See [`SocketService::write`].
    pub async fn write(&self, bytes: &[u8], token: &CancellationToken) -> Result<()> {
        let inner = self.inner.upgrade().ok_or(SocketError::ConnectionClosed)?;
        inner.write(bytes, token).await
    }

    /// See [`SocketService::send_frame`].
    pub async fn send_frame(&self, payload: &[u8], token: &CancellationToken) -> Result<()> {
        let inner = self.inner.upgrade().ok_or(SocketError::ConnectionClosed)?;
        inner.send_frame(payload, token).await
    }
}

async fn lock_or_cancel<'a, T>(
    lock: &'a Mutex<T>,
    token: &CancellationToken,
) -> Result<MutexGuard<'a, T>> {
    tokio::select! {
        biased;
        () = token.cancelled() => Err(SocketError::Cancelled),
        guard = lock.lock() => Ok(guard),
    }
}

async fn write_all_flush<W>(half: &mut W, bytes: &[u8]) -> Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    half.write_all(bytes).await.map_err(TransportError::Io)?;
    half.flush().await.map_err(TransportError::Io)?;
    Ok(())
}

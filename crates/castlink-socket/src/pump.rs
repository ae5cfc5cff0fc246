use castlink_frame::{FrameError, FrameReader};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, SocketError};
use crate::handler::FrameHandler;

/// Why a read pump stopped without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The session scope was cancelled.
    Cancelled,
    /// The transport was closed under the pump.
    Closed,
}

/// Decode frames from `reader` and dispatch them to `handler` until the
/// scope is cancelled, the transport closes, or something fails.
///
/// Frames are delivered strictly in arrival order; the next frame is not
/// read until the handler has finished with the current one.
pub async fn run_read_pump<R, H>(
    mut reader: FrameReader<R>,
    handler: H,
    scope: CancellationToken,
) -> Result<PumpExit>
where
    R: AsyncRead + Unpin,
    H: FrameHandler,
{
    let mut delivered = 0u64;
    let outcome = loop {
        if scope.is_cancelled() {
            break Ok(PumpExit::Cancelled);
        }

        let payload = match reader.read_frame(&scope).await {
            Ok(payload) => payload,
            Err(FrameError::Cancelled) => break Ok(PumpExit::Cancelled),
            Err(err) if err.is_closed() => break Ok(PumpExit::Closed),
            Err(err) => break Err(SocketError::Frame(err)),
        };

        debug!(len = payload.len(), "dispatching frame");
        if let Err(err) = handler.on_frame(payload, true, scope.clone()).await {
            break Err(SocketError::Handler(err));
        }
        delivered += 1;
    };

    match &outcome {
        Ok(PumpExit::Cancelled) => debug!(delivered, "read pump stopped"),
        Ok(PumpExit::Closed) => info!(delivered, "transport closed; read pump stopped"),
        Err(err) => warn!(delivered, error = %err, "read pump failed"),
    }
    outcome
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use bytes::{BufMut, Bytes, BytesMut};
    use castlink_frame::{encode_frame, FrameConfig};
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::error::BoxError;

    type Seen = Arc<Mutex<Vec<Bytes>>>;

    fn recording_handler() -> (
        impl Fn(Bytes, bool, CancellationToken) -> std::future::Ready<std::result::Result<(), BoxError>>
            + Send
            + Sync
            + 'static,
        Seen,
    ) {
        let seen: Seen = Arc::default();
        let sink = Arc::clone(&seen);
        let handler = move |payload: Bytes, is_binary: bool, _token: CancellationToken| {
            assert!(is_binary);
            sink.lock().unwrap().push(payload);
            std::future::ready(Ok(()))
        };
        (handler, seen)
    }

    fn wire(payloads: &[&[u8]]) -> Vec<u8> {
        let mut wire = BytesMut::new();
        for payload in payloads {
            encode_frame(payload, &mut wire).unwrap();
        }
        wire.to_vec()
    }

    #[tokio::test]
    async fn delivers_frames_in_order_then_reports_close() {
        let (handler, seen) = recording_handler();
        let reader = FrameReader::new(Cursor::new(wire(&[b"a", b"bb", b"ccc"])));

        let exit = run_read_pump(reader, handler, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(exit, PumpExit::Closed);
        assert_eq!(*seen.lock().unwrap(), vec!["a", "bb", "ccc"]);
    }

    #[tokio::test]
    async fn truncated_frame_fails_without_delivery() {
        let (handler, seen) = recording_handler();
        let mut bytes = BytesMut::new();
        bytes.put_u32(10);
        bytes.put_slice(b"short");

        let err = run_read_pump(
            FrameReader::new(Cursor::new(bytes.to_vec())),
            handler,
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(err.is_protocol());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_frame_fails() {
        let (handler, _seen) = recording_handler();
        let mut bytes = BytesMut::new();
        bytes.put_u32(4096);

        let reader = FrameReader::with_config(
            Cursor::new(bytes.to_vec()),
            FrameConfig {
                max_payload_size: 128,
            },
        );
        let err = run_read_pump(reader, handler, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SocketError::Frame(FrameError::PayloadTooLarge { size: 4096, max: 128 })
        ));
    }

    #[tokio::test]
    async fn cancellation_stops_pending_read() {
        let (handler, _seen) = recording_handler();
        let (_peer, local) = tokio::io::duplex(64);
        let scope = CancellationToken::new();

        let pump = tokio::spawn(run_read_pump(FrameReader::new(local), handler, scope.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        scope.cancel();

        assert_eq!(pump.await.unwrap().unwrap(), PumpExit::Cancelled);
    }

    #[tokio::test]
    async fn handler_failure_ends_pump() {
        let (mut peer, local) = tokio::io::duplex(64);
        peer.write_all(&wire(&[b"bad"])).await.unwrap();

        let handler = |_payload: Bytes, _is_binary: bool, _token: CancellationToken| async {
            Err::<(), BoxError>("rejected".into())
        };
        let err = run_read_pump(FrameReader::new(local), handler, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SocketError::Handler(ref inner) if inner.to_string() == "rejected"));
    }

    #[tokio::test]
    async fn handler_sees_session_scope() {
        let scope = CancellationToken::new();
        let (mut peer, local) = tokio::io::duplex(64);
        peer.write_all(&wire(&[b"x"])).await.unwrap();

        let handler = |_payload: Bytes, _is_binary: bool, token: CancellationToken| async move {
            token.cancel();
            Ok::<(), BoxError>(())
        };
        let exit = run_read_pump(FrameReader::new(local), handler, scope.clone())
            .await
            .unwrap();

        assert_eq!(exit, PumpExit::Cancelled);
        assert!(scope.is_cancelled());
    }
}

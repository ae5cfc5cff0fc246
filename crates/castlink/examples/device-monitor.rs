//! Device monitor: connects to a simulated cast device, greets it, keeps the
//! session alive with a heartbeat and prints what the device sends back.
//!
//! Run with:
//!   cargo run --example device-monitor
//!
//! Against a real device, use the CLI instead:
//!   cargo run --features cli -- listen 192.168.1.40 --heartbeat-interval 5s

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use castlink::frame::CastCodec;
use castlink::socket::{BoxError, IntervalHeartbeat, StaticHandshake};
use castlink::SocketService;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    // The simulated device answers every frame with "ack:<payload>".
    let device = tokio::spawn(async move {
        let (stream, _) = listener.accept().await?;
        let mut framed = Framed::new(stream, CastCodec::default());
        while let Some(frame) = framed.next().await {
            let frame = frame?;
            let mut reply = BytesMut::from(&b"ack:"[..]);
            reply.extend_from_slice(&frame);
            framed.send(reply.freeze()).await?;
        }
        Ok::<_, Box<dyn std::error::Error + Send + Sync>>(())
    });

    let service = SocketService::new();
    let handshake = StaticHandshake::new(service.writer(), vec![Bytes::from_static(b"CONNECT")]);
    let heartbeat = IntervalHeartbeat::new(
        service.writer(),
        Duration::from_millis(200),
        Bytes::from_static(b"PING"),
    );

    let (tx, mut frames) = mpsc::unbounded_channel();
    let handler = move |payload: Bytes, _is_binary: bool, _token: CancellationToken| {
        std::future::ready(tx.send(payload).map_err(BoxError::from))
    };

    let token = CancellationToken::new();
    service
        .connect("127.0.0.1", port, &handshake, &heartbeat, handler, &token)
        .await?;
    eprintln!("Connected to simulated device on port {port}");

    for _ in 0..4 {
        match frames.recv().await {
            Some(frame) => eprintln!("Device sent: {}", String::from_utf8_lossy(&frame)),
            None => break,
        }
    }

    service.disconnect(&token).await?;
    eprintln!("Disconnected ({:?})", service.state());
    let _ = device.await;
    Ok(())
}

//! Stock connection and heartbeat channels.
//!
//! Application protocols bring their own channels; these cover the common
//! cases of "nothing", "send a fixed greeting" and "ping on a timer".

use std::time::Duration;

use bytes::Bytes;
use castlink_transport::Connector;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::handler::{ConnectionChannel, HeartbeatChannel};
use crate::service::SocketWriter;

/// Channel that does nothing when started.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopChannel;

impl ConnectionChannel for NoopChannel {
    fn open_connection(&self, _scope: CancellationToken) {}
}

impl HeartbeatChannel for NoopChannel {
    fn start_heartbeat(&self, _scope: CancellationToken) {}
}

/// Sends a fixed list of framed payloads when a session opens.
pub struct StaticHandshake<C: Connector> {
    writer: SocketWriter<C>,
    frames: Vec<Bytes>,
}

impl<C: Connector> StaticHandshake<C> {
    pub fn new(writer: SocketWriter<C>, frames: Vec<Bytes>) -> Self {
        Self { writer, frames }
    }
}

impl<C: Connector> ConnectionChannel for StaticHandshake<C> {
    fn open_connection(&self, scope: CancellationToken) {
        let writer = self.writer.clone();
        let frames = self.frames.clone();
        tokio::spawn(async move {
            for (index, payload) in frames.iter().enumerate() {
                if let Err(err) = writer.send_frame(payload, &scope).await {
                    if !scope.is_cancelled() {
                        warn!(index, error = %err, "handshake frame not sent");
                    }
                    return;
                }
            }
            debug!(frames = frames.len(), "handshake sent");
        });
    }
}

/// Sends a framed keep-alive payload on a fixed interval.
///
/// The first ping goes out as soon as the session opens. A failed write ends
/// the heartbeat; the session itself is left to its owner.
pub struct IntervalHeartbeat<C: Connector> {
    writer: SocketWriter<C>,
    interval: Duration,
    payload: Bytes,
}

impl<C: Connector> IntervalHeartbeat<C> {
    pub fn new(writer: SocketWriter<C>, interval: Duration, payload: Bytes) -> Self {
        Self {
            writer,
            interval,
            payload,
        }
    }
}

impl<C: Connector> HeartbeatChannel for IntervalHeartbeat<C> {
    fn start_heartbeat(&self, scope: CancellationToken) {
        let writer = self.writer.clone();
        let payload = self.payload.clone();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::spawn(async move {
            let mut sent = 0u64;
            loop {
                tokio::select! {
                    () = scope.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = writer.send_frame(&payload, &scope).await {
                            if !scope.is_cancelled() {
                                warn!(sent, error = %err, "heartbeat stopped");
                            }
                            return;
                        }
                        sent += 1;
                    }
                }
            }
            debug!(sent, "heartbeat cancelled");
        });
    }
}

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SocketError};
use crate::pump::PumpExit;

/// Observable lifecycle state of a [`SocketService`](crate::SocketService).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session exists.
    Disconnected,
    /// A connect or disconnect is in progress.
    Transitioning,
    /// A session exists and its read pump is running.
    Connected,
    /// A session exists but its read pump has stopped; disconnect to collect
    /// the outcome.
    ReadStopped,
}

/// One connect..disconnect cycle.
///
/// Created whole on a successful connect and consumed whole on disconnect.
/// The write half of the transport lives beside it under the write lock so
/// that writers never contend with the lifecycle lock.
#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) addr: String,
    /// Fires when the caller's connect token or the internal stop signal fires.
    pub(crate) scope: CancellationToken,
    pub(crate) pump: JoinHandle<Result<PumpExit>>,
}

impl Session {
    pub(crate) fn state(&self) -> ConnectionState {
        if self.pump.is_finished() || self.scope.is_cancelled() {
            ConnectionState::ReadStopped
        } else {
            ConnectionState::Connected
        }
    }

    /// Trigger the internal stop signal.
    ///
    /// The scope is a child of the caller's token, so this never cancels
    /// anything the caller owns.
    pub(crate) fn stop(&self) {
        self.scope.cancel();
    }

    /// Wait for the read pump and fold cancellation-shaped outcomes into success.
    pub(crate) async fn join(self) -> Result<PumpExit> {
        match self.pump.await {
            Ok(outcome) => outcome,
            Err(err) if err.is_cancelled() => Ok(PumpExit::Cancelled),
            Err(err) => Err(SocketError::ReadTask(err)),
        }
    }

    /// Abort the read pump without waiting for it.
    pub(crate) fn abort(self) {
        self.scope.cancel();
        self.pump.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn session(pump: JoinHandle<Result<PumpExit>>) -> Session {
        Session {
            addr: "127.0.0.1:8009".to_string(),
            scope: CancellationToken::new(),
            pump,
        }
    }

    #[tokio::test]
    async fn aborted_pump_counts_as_cancelled() {
        let pump = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(PumpExit::Closed)
        });
        pump.abort();

        assert_eq!(session(pump).join().await.unwrap(), PumpExit::Cancelled);
    }

    #[tokio::test]
    async fn pump_failure_is_surfaced() {
        let pump = tokio::spawn(async { Err(SocketError::ConnectionClosed) });
        let err = session(pump).join().await.unwrap_err();
        assert!(matches!(err, SocketError::ConnectionClosed));
    }

    #[tokio::test]
    async fn panicking_pump_is_surfaced() {
        let pump = tokio::spawn(async {
            if true {
                panic!("pump exploded");
            }
            Ok(PumpExit::Closed)
        });
        let err = session(pump).join().await.unwrap_err();
        assert!(matches!(err, SocketError::ReadTask(ref join) if join.is_panic()));
    }

    #[tokio::test]
    async fn state_tracks_scope_and_pump() {
        let scope_only = session(tokio::spawn(std::future::pending()));
        assert_eq!(scope_only.state(), ConnectionState::Connected);
        scope_only.stop();
        assert_eq!(scope_only.state(), ConnectionState::ReadStopped);
        scope_only.abort();

        let finished = session(tokio::spawn(async { Ok(PumpExit::Closed) }));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(finished.state(), ConnectionState::ReadStopped);
    }
}

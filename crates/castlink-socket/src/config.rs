use std::time::Duration;

use castlink_frame::FrameConfig;

/// Configuration for a [`SocketService`](crate::SocketService).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SocketConfig {
    /// Frame codec limits applied to every session.
    pub frame: FrameConfig,
    /// Upper bound on opening the transport. `None` waits for the caller's token.
    pub connect_timeout: Option<Duration>,
}

impl SocketConfig {
    /// Override the maximum accepted frame payload.
    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.frame.max_payload_size = max_payload_size;
        self
    }

    /// Override the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use castlink_frame::DEFAULT_MAX_PAYLOAD;

    use super::*;

    #[test]
    fn defaults_match_frame_codec() {
        let config = SocketConfig::default();
        assert_eq!(config.frame.max_payload_size, DEFAULT_MAX_PAYLOAD);
        assert_eq!(config.connect_timeout, None);
    }

    #[test]
    fn builders_override_fields() {
        let config = SocketConfig::default()
            .with_max_payload_size(1024)
            .with_connect_timeout(Duration::from_secs(3));
        assert_eq!(config.frame.max_payload_size, 1024);
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(3)));
    }
}

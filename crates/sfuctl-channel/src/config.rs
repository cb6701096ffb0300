use std::time::Duration;

use sfuctl_frame::{FrameConfig, MAX_PAYLOAD_LEN};

/// Configuration for a [`Channel`](crate::Channel).
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Worker process id, attached to re-emitted worker log lines.
    pub pid: u32,
    /// Maximum payload size in bytes, both directions. Default: 4 MiB.
    pub max_payload_size: usize,
    /// Time between `close()` and stopping the I/O tasks, so inbound bytes
    /// already in flight are still processed. Default: 200 ms.
    pub close_grace: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            pid: 0,
            max_payload_size: MAX_PAYLOAD_LEN,
            close_grace: Duration::from_millis(200),
        }
    }
}

impl ChannelConfig {
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_close_grace(mut self, grace: Duration) -> Self {
        self.close_grace = grace;
        self
    }

    pub fn with_max_payload_size(mut self, max: usize) -> Self {
        self.max_payload_size = max;
        self
    }

    pub(crate) fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ChannelConfig::default();
        assert_eq!(config.pid, 0);
        assert_eq!(config.max_payload_size, 4_194_304);
        assert_eq!(config.close_grace, Duration::from_millis(200));
    }

    #[test]
    fn builders() {
        let config = ChannelConfig::default()
            .with_pid(4242)
            .with_close_grace(Duration::ZERO)
            .with_max_payload_size(1024);
        assert_eq!(config.pid, 4242);
        assert_eq!(config.close_grace, Duration::ZERO);
        assert_eq!(config.frame_config().max_payload_size, 1024);
    }
}

use std::time::Duration;

/// Configuration for the stream echo probe
///
/// Timeouts are `None` by default, in which case the probe waits
/// indefinitely for the remote side.
///
/// # Examples
///
/// ```
/// use echoprobe::websocket::StreamProbeConfig;
/// use std::time::Duration;
///
/// let config = StreamProbeConfig::default()
///     .with_connect_timeout(Duration::from_secs(5))
///     .with_read_timeout(Duration::from_secs(30));
/// assert_eq!(config.connect_timeout, Some(Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone)]
pub struct StreamProbeConfig {
    /// Limit on TCP connect plus opening handshake
    pub connect_timeout: Option<Duration>,
    /// Limit on waiting for the next inbound frame
    pub read_timeout: Option<Duration>,
    /// How long `close` waits for the peer's Close frame
    pub close_timeout: Duration,
    /// Read buffer size
    pub buffer_size: usize,
    /// Largest accepted message, fragments included
    pub max_payload_size: usize,
}

impl Default for StreamProbeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            read_timeout: None,
            close_timeout: Duration::from_secs(1),
            buffer_size: 4096,
            max_payload_size: 16 * 1024 * 1024, // 16MB
        }
    }
}

impl StreamProbeConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }
}

use std::time::Duration;

/// Configuration for the request probe
///
/// # Examples
///
/// ```rust
/// use echoprobe::request::RequestProbeConfig;
/// use std::time::Duration;
///
/// let config = RequestProbeConfig::default().with_timeout(Duration::from_secs(10));
/// assert_eq!(config.timeout, Some(Duration::from_secs(10)));
/// ```
#[derive(Debug, Clone)]
pub struct RequestProbeConfig {
    /// Limit on the whole exchange; `None` waits indefinitely
    pub timeout: Option<Duration>,
    /// Read buffer size
    pub buffer_size: usize,
    /// Largest accepted response head plus body
    pub max_response_size: usize,
}

impl Default for RequestProbeConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            buffer_size: 4096,
            max_response_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

impl RequestProbeConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_max_response_size(mut self, size: usize) -> Self {
        self.max_response_size = size;
        self
    }
}

use std::time::Duration;
use tonic::transport::Endpoint;

/// Default message size limit in both directions (8MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// HTTP/2 and TCP tuning for client connections.
///
/// Security, retry and interceptors live on [`ClientConfig`](super::ClientConfig);
/// this only shapes the underlying channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    // HTTP/2 Keep-Alive
    pub http2_keep_alive_interval: Option<Duration>,
    pub keep_alive_timeout: Duration,
    pub keep_alive_while_idle: bool,

    // Connection settings
    pub connect_timeout: Duration,
    /// Transport-level deadline for every request; `None` leaves calls unbounded
    /// unless the retry policy sets a per-attempt timeout.
    pub request_timeout: Option<Duration>,
    /// Defer dialing until the first call.
    pub lazy: bool,

    // Window sizes (HTTP/2 flow control)
    pub initial_connection_window_size: Option<u32>,
    pub initial_stream_window_size: Option<u32>,
    pub http2_adaptive_window: bool,

    // TCP settings
    pub tcp_nodelay: bool,
    pub tcp_keepalive: Option<Duration>,

    // Message limits
    pub max_decoding_message_size: usize,
    pub max_encoding_message_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            http2_keep_alive_interval: Some(Duration::from_secs(30)),
            keep_alive_timeout: Duration::from_secs(10),
            keep_alive_while_idle: true,
            connect_timeout: Duration::from_secs(5),
            request_timeout: None,
            lazy: false,
            initial_connection_window_size: Some(1024 * 1024), // 1MB
            initial_stream_window_size: Some(1024 * 1024),     // 1MB
            http2_adaptive_window: true,
            tcp_nodelay: true,
            tcp_keepalive: Some(Duration::from_secs(30)),
            max_decoding_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_encoding_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl ChannelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the request timeout for individual RPCs
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.http2_keep_alive_interval = Some(interval);
        self
    }

    /// Disable HTTP/2 keep-alive
    pub fn without_keep_alive(mut self) -> Self {
        self.http2_keep_alive_interval = None;
        self
    }

    /// Set both connection and stream window sizes to the same value
    pub fn with_window_size(mut self, size: u32) -> Self {
        self.initial_connection_window_size = Some(size);
        self.initial_stream_window_size = Some(size);
        self
    }

    /// Return the channel immediately and connect on the first call.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn with_max_message_size(mut self, limit: usize) -> Self {
        self.max_decoding_message_size = limit;
        self.max_encoding_message_size = limit;
        self
    }

    /// Apply this configuration to a tonic Endpoint
    pub(crate) fn apply_to_endpoint(&self, mut endpoint: Endpoint) -> Endpoint {
        if let Some(interval) = self.http2_keep_alive_interval {
            endpoint = endpoint.http2_keep_alive_interval(interval);
        }
        endpoint = endpoint
            .keep_alive_timeout(self.keep_alive_timeout)
            .keep_alive_while_idle(self.keep_alive_while_idle)
            .connect_timeout(self.connect_timeout);

        if let Some(timeout) = self.request_timeout {
            endpoint = endpoint.timeout(timeout);
        }

        if let Some(size) = self.initial_connection_window_size {
            endpoint = endpoint.initial_connection_window_size(size);
        }
        if let Some(size) = self.initial_stream_window_size {
            endpoint = endpoint.initial_stream_window_size(size);
        }
        endpoint = endpoint.http2_adaptive_window(self.http2_adaptive_window);

        endpoint
            .tcp_nodelay(self.tcp_nodelay)
            .tcp_keepalive(self.tcp_keepalive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ChannelConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.initial_connection_window_size, Some(1024 * 1024));
        assert_eq!(config.initial_stream_window_size, Some(1024 * 1024));
        assert_eq!(config.max_decoding_message_size, DEFAULT_MAX_MESSAGE_SIZE);
        assert!(config.tcp_nodelay);
        assert!(config.http2_adaptive_window);
        assert!(!config.lazy);
    }

    #[test]
    fn test_builder_pattern() {
        let config = ChannelConfig::new()
            .with_connect_timeout(Duration::from_secs(10))
            .with_request_timeout(Duration::from_secs(120))
            .with_window_size(2 * 1024 * 1024)
            .with_max_message_size(1024)
            .lazy();

        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(120)));
        assert_eq!(config.initial_connection_window_size, Some(2 * 1024 * 1024));
        assert_eq!(config.initial_stream_window_size, Some(2 * 1024 * 1024));
        assert_eq!(config.max_encoding_message_size, 1024);
        assert!(config.lazy);
    }

    #[test]
    fn test_disable_keep_alive() {
        let config = ChannelConfig::new().without_keep_alive();
        assert_eq!(config.http2_keep_alive_interval, None);
    }

    #[test]
    fn test_apply_to_endpoint_keeps_uri() {
        let endpoint = Endpoint::from_static("http://127.0.0.1:50051");
        let endpoint = ChannelConfig::default().apply_to_endpoint(endpoint);
        assert_eq!(endpoint.uri().host(), Some("127.0.0.1"));
        assert_eq!(endpoint.uri().port_u16(), Some(50051));
    }
}

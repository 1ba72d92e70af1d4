//! Server configuration loaded from environment variables.

use crate::client::DEFAULT_MAX_MESSAGE_SIZE;
use crate::credentials::ServerCredentialsConfig;
use crate::interceptors::{InterceptorSet, StreamInterceptor, UnaryInterceptor};
use crate::logger::SharedLogger;
use core_config::{ConfigError, FromEnv, env_flag, env_or_default, env_parse};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Configuration for [`new_server`](super::new_server).
#[derive(Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: [::1] for IPv6 localhost)
    pub host: String,
    /// Port to listen on (default: 50051)
    pub port: u16,
    pub credentials: ServerCredentialsConfig,
    /// Caller interceptors, placed after recovery.
    pub interceptors: InterceptorSet,
    /// Sink for recovery records and the startup notice; `None` discards them.
    pub logger: Option<SharedLogger>,
    pub tcp_nodelay: bool,
    pub http2_keep_alive_interval: Option<Duration>,
    pub http2_keep_alive_timeout: Duration,
    pub max_concurrent_streams: Option<u32>,
    /// Maximum message size for decoding (default: 8MB)
    pub max_decoding_message_size: usize,
    /// Maximum message size for encoding (default: 8MB)
    pub max_encoding_message_size: usize,
    /// How long shutdown waits for open connections to drain (default: 30s)
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "[::1]".to_string(),
            port: 50051,
            credentials: ServerCredentialsConfig::default(),
            interceptors: InterceptorSet::default(),
            logger: None,
            tcp_nodelay: true,
            http2_keep_alive_interval: Some(Duration::from_secs(60)),
            http2_keep_alive_timeout: Duration::from_secs(20),
            max_concurrent_streams: None,
            max_decoding_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_encoding_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Get the socket address to bind to.
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.addr_string().parse()
    }

    /// Get the address string (for logging).
    pub fn addr_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromEnv for ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads:
    /// - `GRPC_HOST` (default: [::1])
    /// - `GRPC_PORT` (default: 50051)
    /// - `GRPC_SERVER_CA_PATH`, `GRPC_SERVER_CERT_PATH`, `GRPC_SERVER_KEY_PATH`
    /// - `GRPC_TCP_NODELAY` (default: true)
    /// - `GRPC_MAX_MESSAGE_SIZE` (default: 8388608 / 8MB)
    /// - `GRPC_SHUTDOWN_GRACE_MS` (default: 30000)
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let max_message_size = env_parse("GRPC_MAX_MESSAGE_SIZE", DEFAULT_MAX_MESSAGE_SIZE)?;

        Ok(Self {
            host: env_or_default("GRPC_HOST", &defaults.host),
            port: env_parse("GRPC_PORT", defaults.port)?,
            credentials: ServerCredentialsConfig::from_env()?,
            tcp_nodelay: env_flag("GRPC_TCP_NODELAY", defaults.tcp_nodelay)?,
            max_decoding_message_size: max_message_size,
            max_encoding_message_size: max_message_size,
            shutdown_grace: Duration::from_millis(env_parse(
                "GRPC_SHUTDOWN_GRACE_MS",
                DEFAULT_SHUTDOWN_GRACE.as_millis() as u64,
            )?),
            ..defaults
        })
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("addr", &self.addr_string())
            .field("credentials", &self.credentials)
            .field("interceptors", &self.interceptors)
            .field("logger", &self.logger.is_some())
            .field("tcp_nodelay", &self.tcp_nodelay)
            .field("http2_keep_alive_interval", &self.http2_keep_alive_interval)
            .field("max_concurrent_streams", &self.max_concurrent_streams)
            .field("max_decoding_message_size", &self.max_decoding_message_size)
            .field("shutdown_grace", &self.shutdown_grace)
            .finish()
    }
}

#[derive(Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn credentials(mut self, credentials: ServerCredentialsConfig) -> Self {
        self.config.credentials = credentials;
        self
    }

    pub fn interceptors(mut self, interceptors: InterceptorSet) -> Self {
        self.config.interceptors = interceptors;
        self
    }

    pub fn unary_interceptor<I: UnaryInterceptor + 'static>(mut self, interceptor: I) -> Self {
        self.config.interceptors.unary.push(Arc::new(interceptor));
        self
    }

    pub fn stream_interceptor<I: StreamInterceptor + 'static>(mut self, interceptor: I) -> Self {
        self.config.interceptors.streaming.push(Arc::new(interceptor));
        self
    }

    pub fn logger(mut self, logger: SharedLogger) -> Self {
        self.config.logger = Some(logger);
        self
    }

    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.config.tcp_nodelay = enabled;
        self
    }

    pub fn http2_keep_alive(mut self, interval: Option<Duration>, timeout: Duration) -> Self {
        self.config.http2_keep_alive_interval = interval;
        self.config.http2_keep_alive_timeout = timeout;
        self
    }

    pub fn max_concurrent_streams(mut self, limit: u32) -> Self {
        self.config.max_concurrent_streams = Some(limit);
        self
    }

    /// Set maximum message size in both directions.
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_decoding_message_size = size;
        self.config.max_encoding_message_size = size;
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.shutdown_grace = grace;
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}

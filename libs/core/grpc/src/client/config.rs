use super::ChannelConfig;
use crate::credentials::ClientCredentialsConfig;
use crate::interceptors::{FieldExtractor, InterceptorSet, RetryOptions, StreamInterceptor, UnaryInterceptor};
use crate::logger::SharedLogger;
use core_config::{ConfigError, FromEnv};
use std::fmt;
use std::sync::Arc;

/// Everything [`new_connection`](super::new_connection) needs besides the address.
///
/// Immutable once built; share it freely between connections.
#[derive(Clone, Default)]
pub struct ClientConfig {
    credentials: ClientCredentialsConfig,
    retry: RetryOptions,
    channel: ChannelConfig,
    interceptors: InterceptorSet,
    log_fields: Vec<FieldExtractor>,
    logger: Option<SharedLogger>,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    pub fn credentials(&self) -> &ClientCredentialsConfig {
        &self.credentials
    }

    pub fn retry(&self) -> &RetryOptions {
        &self.retry
    }

    pub fn channel(&self) -> &ChannelConfig {
        &self.channel
    }

    pub fn interceptors(&self) -> &InterceptorSet {
        &self.interceptors
    }

    pub fn log_fields(&self) -> &[FieldExtractor] {
        &self.log_fields
    }

    /// Injected logger; `None` means call records are discarded.
    pub fn logger(&self) -> Option<&SharedLogger> {
        self.logger.as_ref()
    }
}

impl FromEnv for ClientConfig {
    /// Credentials from `GRPC_CLIENT_*` and retry options from `GRPC_RETRY_*`;
    /// everything else keeps its default.
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::builder()
            .credentials(ClientCredentialsConfig::from_env()?)
            .retry(RetryOptions::from_env()?)
            .build())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("credentials", &self.credentials)
            .field("retry", &self.retry)
            .field("channel", &self.channel)
            .field("interceptors", &self.interceptors)
            .field("log_fields", &self.log_fields.len())
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn credentials(mut self, credentials: ClientCredentialsConfig) -> Self {
        self.config.credentials = credentials;
        self
    }

    /// Shorthand for plaintext credentials.
    pub fn insecure(self) -> Self {
        self.credentials(ClientCredentialsConfig::insecure())
    }

    pub fn retry(mut self, retry: RetryOptions) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn channel(mut self, channel: ChannelConfig) -> Self {
        self.config.channel = channel;
        self
    }

    /// Replace the caller-supplied interceptors.
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

    pub fn log_field(mut self, extractor: FieldExtractor) -> Self {
        self.config.log_fields.push(extractor);
        self
    }

    pub fn logger(mut self, logger: SharedLogger) -> Self {
        self.config.logger = Some(logger);
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptors::{RequestIdInterceptor, fields};
    use crate::logger::RecordingLogger;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.credentials(), &ClientCredentialsConfig::default());
        assert_eq!(config.retry(), &RetryOptions::default());
        assert_eq!(config.retry().max_attempts(), 1);
        assert!(config.interceptors().is_empty());
        assert!(config.log_fields().is_empty());
        assert!(config.logger().is_none());
    }

    #[test]
    fn test_builder_collects_everything() {
        let config = ClientConfig::builder()
            .insecure()
            .retry(RetryOptions::new().with_max_retries(2))
            .channel(ChannelConfig::new().lazy())
            .unary_interceptor(RequestIdInterceptor::new())
            .stream_interceptor(RequestIdInterceptor::new())
            .log_field(fields::service())
            .log_field(fields::metadata("x-request-id"))
            .logger(Arc::new(RecordingLogger::new()))
            .build();

        assert!(config.credentials().insecure);
        assert_eq!(config.retry().max_retries, 2);
        assert!(config.channel().lazy);
        assert_eq!(config.interceptors().unary.len(), 1);
        assert_eq!(config.interceptors().streaming.len(), 1);
        assert_eq!(config.log_fields().len(), 2);
        assert!(config.logger().is_some());
    }

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            [
                ("GRPC_CLIENT_CA_PATH", Some("/etc/tls/ca.pem")),
                ("GRPC_CLIENT_CERT_PATH", None),
                ("GRPC_CLIENT_KEY_PATH", None),
                ("GRPC_CLIENT_SERVER_NAME", None),
                ("GRPC_CLIENT_INSECURE", None),
                ("GRPC_RETRY_MAX", Some("2")),
                ("GRPC_RETRY_TIMEOUT_MS", Some("1500")),
            ],
            || {
                let config = ClientConfig::from_env().unwrap();
                assert_eq!(config.credentials().ca_path, Some(PathBuf::from("/etc/tls/ca.pem")));
                assert_eq!(config.retry().max_retries, 2);
                assert_eq!(config.retry().per_attempt_timeout, Duration::from_millis(1500));
            },
        );
    }
}

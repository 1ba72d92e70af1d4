use super::{StreamInterceptor, StreamNext, UnaryInterceptor, UnaryNext};
use crate::call::{CallContext, MessageStream, StreamRequest};
use async_trait::async_trait;
use bytes::Bytes;
use core_config::{ConfigError, FromEnv, env_parse};
use std::future::Future;
use std::time::Duration;
use tokio::time::error::Elapsed;
use tonic::{Code, Status};

/// Retry parameters for outbound calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOptions {
    /// Retries after the first attempt; `N` allows up to `N + 1` attempts.
    pub max_retries: u32,
    /// Bound on each attempt. Zero disables the bound.
    pub per_attempt_timeout: Duration,
    /// Retry `k` waits `k * backoff_unit` first.
    pub backoff_unit: Duration,
    /// Status codes treated as transient.
    pub retryable_codes: Vec<Code>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 0,
            per_attempt_timeout: Duration::ZERO,
            backoff_unit: Duration::from_secs(1),
            retryable_codes: vec![Code::Unavailable, Code::ResourceExhausted],
        }
    }
}

impl RetryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single attempt, never retried. Same as the default.
    pub fn disabled() -> Self {
        Self::default().with_max_retries(0)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_per_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.per_attempt_timeout = timeout;
        self
    }

    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    pub fn with_retryable_codes(mut self, codes: impl IntoIterator<Item = Code>) -> Self {
        self.retryable_codes = codes.into_iter().collect();
        self
    }

    /// Attempts made against a persistently failing call.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn is_retryable(&self, code: Code) -> bool {
        self.retryable_codes.contains(&code)
    }

    /// Wait before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        self.backoff_unit.saturating_mul(retry)
    }

    fn attempt_timeout(&self) -> Option<Duration> {
        (!self.per_attempt_timeout.is_zero()).then_some(self.per_attempt_timeout)
    }
}

impl FromEnv for RetryOptions {
    /// Reads `GRPC_RETRY_MAX` (default: 0, single attempt) and `GRPC_RETRY_TIMEOUT_MS` (default: 0, no bound).
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            max_retries: env_parse("GRPC_RETRY_MAX", defaults.max_retries)?,
            per_attempt_timeout: Duration::from_millis(env_parse("GRPC_RETRY_TIMEOUT_MS", 0u64)?),
            ..defaults
        })
    }
}

/// Client interceptor that re-runs the inner chain on transient failures.
///
/// Placed outermost, so every attempt passes through logging and any custom
/// interceptors again. A locally timed-out attempt becomes `DeadlineExceeded`
/// and is always treated as transient. Once attempts run out the last failure
/// is returned as is.
///
/// Streaming calls are retried only while opening the stream, and only when
/// the request is [`StreamRequest::Buffered`].
#[derive(Debug, Clone, Default)]
pub struct RetryInterceptor {
    options: RetryOptions,
}

impl RetryInterceptor {
    pub fn new(options: RetryOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RetryOptions {
        &self.options
    }

    /// Context for one attempt: the call's timeout, tightened to the per-attempt bound.
    fn attempt_context(&self, ctx: &CallContext) -> CallContext {
        let mut attempt = ctx.clone();
        if let Some(bound) = self.options.attempt_timeout() {
            let timeout = ctx.timeout().map_or(bound, |existing| existing.min(bound));
            attempt.set_timeout(Some(timeout));
        }
        attempt
    }

    async fn bounded<F: Future>(&self, attempt: F) -> Result<F::Output, Elapsed> {
        match self.options.attempt_timeout() {
            Some(bound) => tokio::time::timeout(bound, attempt).await,
            None => Ok(attempt.await),
        }
    }

    /// Decide what to do with a failed attempt: `Ok` to retry, `Err` to give up.
    async fn after_failure(
        &self,
        ctx: &CallContext,
        outcome: Result<Status, Elapsed>,
        retries: &mut u32,
    ) -> Result<(), Status> {
        let (status, transient) = match outcome {
            Ok(status) => {
                let transient = self.options.is_retryable(status.code());
                (status, transient)
            }
            Err(_) => (
                Status::deadline_exceeded(format!(
                    "attempt exceeded {:?}",
                    self.options.per_attempt_timeout
                )),
                true,
            ),
        };

        if !transient || *retries >= self.options.max_retries {
            return Err(status);
        }

        *retries += 1;
        let delay = self.options.backoff(*retries);
        tracing::debug!(
            target: "grpc_bootstrap",
            method = ctx.method(),
            code = ?status.code(),
            retry = *retries,
            delay = ?delay,
            "retrying call"
        );
        tokio::time::sleep(delay).await;
        Ok(())
    }
}

#[async_trait]
impl UnaryInterceptor for RetryInterceptor {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: Bytes,
        next: UnaryNext<'_>,
    ) -> Result<Bytes, Status> {
        let mut retries = 0;
        loop {
            let attempt = next.run(self.attempt_context(&ctx), request.clone());
            let outcome = match self.bounded(attempt).await {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(status)) => Ok(status),
                Err(elapsed) => Err(elapsed),
            };
            self.after_failure(&ctx, outcome, &mut retries).await?;
        }
    }
}

#[async_trait]
impl StreamInterceptor for RetryInterceptor {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: StreamRequest,
        next: StreamNext<'_>,
    ) -> Result<MessageStream, Status> {
        let messages = match request {
            StreamRequest::Buffered(messages) => messages,
            live => {
                let attempt = next.run(self.attempt_context(&ctx), live);
                return self.bounded(attempt).await.unwrap_or_else(|_| {
                    Err(Status::deadline_exceeded(format!(
                        "attempt exceeded {:?}",
                        self.options.per_attempt_timeout
                    )))
                });
            }
        };

        let mut retries = 0;
        loop {
            let request = StreamRequest::Buffered(messages.clone());
            let attempt = next.run(self.attempt_context(&ctx), request);
            let outcome = match self.bounded(attempt).await {
                Ok(Ok(stream)) => return Ok(stream),
                Ok(Err(status)) => Ok(status),
                Err(elapsed) => Err(elapsed),
            };
            self.after_failure(&ctx, outcome, &mut retries).await?;
        }
    }
}

//! Call interceptors and their composition.
//!
//! Built-in interceptors:
//! - [`RetryInterceptor`]: linear backoff with a per-attempt timeout (client)
//! - [`LoggingInterceptor`]: one structured record per call (client)
//! - [`RecoveryInterceptor`]: turns handler panics into `Internal` (server)
//! - [`RequestIdInterceptor`]: stamps `x-request-id` on outgoing calls

pub mod chain;
pub mod fields;
pub mod logging;
pub mod recovery;
pub mod request_id;
pub mod retry;

pub use chain::{StreamChain, StreamNext, UnaryChain, UnaryNext};
pub use logging::{FieldExtractor, LoggingInterceptor, code_name, severity_for};
pub use recovery::RecoveryInterceptor;
pub use request_id::{REQUEST_ID_HEADER, RequestIdInterceptor};
pub use retry::{RetryInterceptor, RetryOptions};

use crate::call::{CallContext, MessageStream, StreamRequest};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tonic::Status;

/// Middleware around a unary call.
///
/// Implementations call `next.run(ctx, request)` to continue the chain, or
/// return early to short-circuit it.
#[async_trait]
pub trait UnaryInterceptor: Send + Sync {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: Bytes,
        next: UnaryNext<'_>,
    ) -> Result<Bytes, Status>;
}

/// Middleware around a streaming call. Sees the call up to the point the
/// response stream is returned; wrap the stream to observe its items.
#[async_trait]
pub trait StreamInterceptor: Send + Sync {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: StreamRequest,
        next: StreamNext<'_>,
    ) -> Result<MessageStream, Status>;
}

/// Caller-supplied interceptors, appended after the built-in ones.
#[derive(Clone, Default)]
pub struct InterceptorSet {
    pub unary: Vec<Arc<dyn UnaryInterceptor>>,
    pub streaming: Vec<Arc<dyn StreamInterceptor>>,
}

impl InterceptorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unary<I: UnaryInterceptor + 'static>(mut self, interceptor: I) -> Self {
        self.unary.push(Arc::new(interceptor));
        self
    }

    pub fn with_streaming<I: StreamInterceptor + 'static>(mut self, interceptor: I) -> Self {
        self.streaming.push(Arc::new(interceptor));
        self
    }

    /// Register one interceptor instance on both the unary and streaming chains.
    pub fn with_both<I>(mut self, interceptor: I) -> Self
    where
        I: UnaryInterceptor + StreamInterceptor + 'static,
    {
        let shared = Arc::new(interceptor);
        self.unary.push(shared.clone());
        self.streaming.push(shared);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.unary.is_empty() && self.streaming.is_empty()
    }

    /// Unary chain of `builtin` followed by these interceptors.
    pub(crate) fn unary_chain(&self, builtin: Vec<Arc<dyn UnaryInterceptor>>) -> UnaryChain {
        let mut all = builtin;
        all.extend(self.unary.iter().cloned());
        UnaryChain::new(all)
    }

    pub(crate) fn stream_chain(&self, builtin: Vec<Arc<dyn StreamInterceptor>>) -> StreamChain {
        let mut all = builtin;
        all.extend(self.streaming.iter().cloned());
        StreamChain::new(all)
    }
}

impl fmt::Debug for InterceptorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorSet")
            .field("unary", &self.unary.len())
            .field("streaming", &self.streaming.len())
            .finish()
    }
}

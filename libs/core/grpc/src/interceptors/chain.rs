use super::{StreamInterceptor, UnaryInterceptor};
use crate::call::{CallContext, MessageStream, StreamHandler, StreamRequest, UnaryHandler};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use tonic::Status;

/// Remainder of a unary chain, handed to each interceptor.
///
/// `run` may be called more than once (that is how retry works); each call
/// runs every inner interceptor and the handler again.
#[derive(Clone, Copy)]
pub struct UnaryNext<'a> {
    rest: &'a [Arc<dyn UnaryInterceptor>],
    tail: UnaryTail<'a>,
}

#[derive(Clone, Copy)]
enum UnaryTail<'a> {
    Handler(&'a dyn UnaryHandler),
    /// Continue in the enclosing chain once a nested chain is exhausted.
    Outer(&'a UnaryNext<'a>),
}

impl<'a> UnaryNext<'a> {
    pub fn run(self, ctx: CallContext, request: Bytes) -> BoxFuture<'a, Result<Bytes, Status>> {
        match self.rest.split_first() {
            Some((head, rest)) => head.intercept(
                ctx,
                request,
                UnaryNext {
                    rest,
                    tail: self.tail,
                },
            ),
            None => match self.tail {
                UnaryTail::Handler(handler) => handler.call(ctx, request),
                UnaryTail::Outer(outer) => outer.run(ctx, request),
            },
        }
    }
}

/// Remainder of a streaming chain.
#[derive(Clone, Copy)]
pub struct StreamNext<'a> {
    rest: &'a [Arc<dyn StreamInterceptor>],
    tail: StreamTail<'a>,
}

#[derive(Clone, Copy)]
enum StreamTail<'a> {
    Handler(&'a dyn StreamHandler),
    Outer(&'a StreamNext<'a>),
}

impl<'a> StreamNext<'a> {
    pub fn run(
        self,
        ctx: CallContext,
        request: StreamRequest,
    ) -> BoxFuture<'a, Result<MessageStream, Status>> {
        match self.rest.split_first() {
            Some((head, rest)) => head.intercept(
                ctx,
                request,
                StreamNext {
                    rest,
                    tail: self.tail,
                },
            ),
            None => match self.tail {
                StreamTail::Handler(handler) => handler.call(ctx, request),
                StreamTail::Outer(outer) => outer.run(ctx, request),
            },
        }
    }
}

/// Ordered unary interceptors; the first one is the outermost.
///
/// A chain is itself an interceptor, so chains nest.
#[derive(Clone, Default)]
pub struct UnaryChain {
    interceptors: Vec<Arc<dyn UnaryInterceptor>>,
}

impl UnaryChain {
    pub fn new(interceptors: Vec<Arc<dyn UnaryInterceptor>>) -> Self {
        Self { interceptors }
    }

    /// Append an interceptor (it becomes the new innermost).
    pub fn with<I: UnaryInterceptor + 'static>(self, interceptor: I) -> Self {
        self.with_shared(Arc::new(interceptor))
    }

    pub fn with_shared(mut self, interceptor: Arc<dyn UnaryInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Run the chain with `handler` as the terminal step.
    pub async fn run(
        &self,
        ctx: CallContext,
        request: Bytes,
        handler: &dyn UnaryHandler,
    ) -> Result<Bytes, Status> {
        UnaryNext {
            rest: &self.interceptors,
            tail: UnaryTail::Handler(handler),
        }
        .run(ctx, request)
        .await
    }
}

#[async_trait]
impl UnaryInterceptor for UnaryChain {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: Bytes,
        next: UnaryNext<'_>,
    ) -> Result<Bytes, Status> {
        UnaryNext {
            rest: &self.interceptors,
            tail: UnaryTail::Outer(&next),
        }
        .run(ctx, request)
        .await
    }
}

impl fmt::Debug for UnaryChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnaryChain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}

/// Ordered streaming interceptors; the first one is the outermost.
#[derive(Clone, Default)]
pub struct StreamChain {
    interceptors: Vec<Arc<dyn StreamInterceptor>>,
}

impl StreamChain {
    pub fn new(interceptors: Vec<Arc<dyn StreamInterceptor>>) -> Self {
        Self { interceptors }
    }

    pub fn with<I: StreamInterceptor + 'static>(self, interceptor: I) -> Self {
        self.with_shared(Arc::new(interceptor))
    }

    pub fn with_shared(mut self, interceptor: Arc<dyn StreamInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub async fn run(
        &self,
        ctx: CallContext,
        request: StreamRequest,
        handler: &dyn StreamHandler,
    ) -> Result<MessageStream, Status> {
        StreamNext {
            rest: &self.interceptors,
            tail: StreamTail::Handler(handler),
        }
        .run(ctx, request)
        .await
    }
}

#[async_trait]
impl StreamInterceptor for StreamChain {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: StreamRequest,
        next: StreamNext<'_>,
    ) -> Result<MessageStream, Status> {
        StreamNext {
            rest: &self.interceptors,
            tail: StreamTail::Outer(&next),
        }
        .run(ctx, request)
        .await
    }
}

impl fmt::Debug for StreamChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamChain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}

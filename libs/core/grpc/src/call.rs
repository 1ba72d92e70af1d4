//! Call-level model shared by client and server chains.
//!
//! Interceptors see encoded protobuf payloads as [`Bytes`]; decoding into
//! concrete message types happens at the edges (see `Connection::call`).

use bytes::Bytes;
use futures::Stream;
use futures::future::BoxFuture;
use futures::stream;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;
use tonic::Status;
use tonic::metadata::MetadataMap;

/// Stream of encoded messages, terminated by the end of the stream or an error item.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<Bytes, Status>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Unary,
    Streaming,
}

/// Per-call context handed to every interceptor and handler.
///
/// Each call owns its context; interceptors may modify their copy (for example
/// to add metadata or tighten the timeout) before passing it on.
#[derive(Debug, Clone)]
pub struct CallContext {
    method: String,
    kind: CallKind,
    metadata: MetadataMap,
    timeout: Option<Duration>,
    peer: Option<SocketAddr>,
}

impl CallContext {
    /// `method` is the full gRPC path (`/package.Service/Method`); a missing
    /// leading slash is added.
    pub fn new(method: impl Into<String>, kind: CallKind) -> Self {
        let mut method = method.into();
        if !method.starts_with('/') {
            method.insert(0, '/');
        }
        Self {
            method,
            kind,
            metadata: MetadataMap::new(),
            timeout: None,
            peer: None,
        }
    }

    pub fn unary(method: impl Into<String>) -> Self {
        Self::new(method, CallKind::Unary)
    }

    pub fn streaming(method: impl Into<String>) -> Self {
        Self::new(method, CallKind::Streaming)
    }

    pub fn with_metadata(mut self, metadata: MetadataMap) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Full method path, always starting with `/`.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// `package.Service` part of the method path, empty if the path has no service.
    pub fn service(&self) -> &str {
        self.method[1..]
            .rsplit_once('/')
            .map(|(service, _)| service)
            .unwrap_or("")
    }

    /// Bare method name after the last `/`.
    pub fn method_name(&self) -> &str {
        self.method
            .rsplit_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.method)
    }

    pub fn kind(&self) -> CallKind {
        self.kind
    }

    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut MetadataMap {
        &mut self.metadata
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }
}

/// Outbound side of a streaming call.
///
/// Only [`StreamRequest::Buffered`] can be replayed, so it is the only kind the
/// retry interceptor will attempt more than once.
pub enum StreamRequest {
    Buffered(Vec<Bytes>),
    Live(MessageStream),
}

impl StreamRequest {
    pub fn buffered(messages: impl IntoIterator<Item = Bytes>) -> Self {
        StreamRequest::Buffered(messages.into_iter().collect())
    }

    /// A single request message, as used by server-streaming calls.
    pub fn single(message: Bytes) -> Self {
        StreamRequest::Buffered(vec![message])
    }

    pub fn live<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, Status>> + Send + 'static,
    {
        StreamRequest::Live(Box::pin(stream))
    }

    pub fn is_replayable(&self) -> bool {
        matches!(self, StreamRequest::Buffered(_))
    }

    /// A copy of a buffered request; `None` for live streams.
    pub fn try_clone(&self) -> Option<Self> {
        match self {
            StreamRequest::Buffered(messages) => Some(StreamRequest::Buffered(messages.clone())),
            StreamRequest::Live(_) => None,
        }
    }

    pub fn into_stream(self) -> MessageStream {
        match self {
            StreamRequest::Buffered(messages) => Box::pin(stream::iter(messages.into_iter().map(Ok))),
            StreamRequest::Live(stream) => stream,
        }
    }
}

impl fmt::Debug for StreamRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamRequest::Buffered(messages) => f
                .debug_tuple("Buffered")
                .field(&messages.len())
                .finish(),
            StreamRequest::Live(_) => f.write_str("Live"),
        }
    }
}

/// Terminal handler of a unary chain.
///
/// Implemented for any `Fn(CallContext, Bytes) -> impl Future` closure.
pub trait UnaryHandler: Send + Sync {
    fn call(&self, ctx: CallContext, request: Bytes) -> BoxFuture<'_, Result<Bytes, Status>>;
}

impl<F, Fut> UnaryHandler for F
where
    F: Fn(CallContext, Bytes) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Bytes, Status>> + Send + 'static,
{
    fn call(&self, ctx: CallContext, request: Bytes) -> BoxFuture<'_, Result<Bytes, Status>> {
        Box::pin((self)(ctx, request))
    }
}

/// Terminal handler of a streaming chain.
pub trait StreamHandler: Send + Sync {
    fn call(
        &self,
        ctx: CallContext,
        request: StreamRequest,
    ) -> BoxFuture<'_, Result<MessageStream, Status>>;
}

impl<F, Fut> StreamHandler for F
where
    F: Fn(CallContext, StreamRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<MessageStream, Status>> + Send + 'static,
{
    fn call(
        &self,
        ctx: CallContext,
        request: StreamRequest,
    ) -> BoxFuture<'_, Result<MessageStream, Status>> {
        Box::pin((self)(ctx, request))
    }
}

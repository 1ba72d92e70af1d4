//! Connection factory.
//!
//! [`new_connection`] resolves client credentials, assembles the call chains
//! (`[retry, logging, custom...]` for both unary and streaming calls) and dials
//! the target with tonic.
//!
//! ```ignore
//! use grpc_bootstrap::{ClientConfig, ClientCredentialsConfig, RetryOptions, new_connection};
//!
//! let config = ClientConfig::builder()
//!     .credentials(ClientCredentialsConfig::new().with_ca("/etc/tls/ca.pem"))
//!     .retry(RetryOptions::new().with_max_retries(2))
//!     .build();
//! let conn = new_connection("tasks.internal:50051", &config).await?;
//! let reply: GetTaskResponse = conn.call("/tasks.v1.Tasks/GetTask", &request).await?;
//! ```

mod channel;
mod config;

pub use channel::{ChannelConfig, DEFAULT_MAX_MESSAGE_SIZE};
pub use config::{ClientConfig, ClientConfigBuilder};

use crate::call::{CallContext, MessageStream, StreamHandler, StreamRequest, UnaryHandler};
use crate::codec::RawCodec;
use crate::credentials::{ClientSecurity, TlsMode, resolve_client};
use crate::error::{Error, Result};
use crate::interceptors::{
    LoggingInterceptor, RetryInterceptor, StreamChain, StreamInterceptor, UnaryChain, UnaryInterceptor,
};
use crate::logger::{NoopLogger, SharedLogger};
use bytes::Bytes;
use futures::StreamExt;
use futures::future::{self, BoxFuture};
use http::uri::PathAndQuery;
use std::sync::Arc;
use tonic::Status;
use tonic::transport::{Channel, Endpoint};

/// An open client connection with its interceptor chains attached.
///
/// Cheap to clone; clones share the underlying channel.
#[derive(Clone)]
pub struct Connection {
    target: String,
    mode: TlsMode,
    transport: ChannelCall,
    unary: Arc<UnaryChain>,
    streaming: Arc<StreamChain>,
}

/// Open a connection to `address` using `config`.
///
/// `address` may be `host:port` or a full URI; without a scheme, `https` is
/// used when TLS is configured and `http` otherwise.
pub async fn new_connection(address: impl Into<String>, config: &ClientConfig) -> Result<Connection> {
    let address = address.into();

    let security = resolve_client(config.credentials()).map_err(Error::ClientCredentials)?;
    let mode = security.mode();

    let logger: SharedLogger = config
        .logger()
        .cloned()
        .unwrap_or_else(|| Arc::new(NoopLogger));
    let retry = Arc::new(RetryInterceptor::new(config.retry().clone()));
    let logging =
        Arc::new(LoggingInterceptor::new(logger).with_fields(config.log_fields().iter().cloned()));

    let unary = config.interceptors().unary_chain(vec![
        retry.clone() as Arc<dyn UnaryInterceptor>,
        logging.clone() as Arc<dyn UnaryInterceptor>,
    ]);
    let streaming = config.interceptors().stream_chain(vec![
        retry as Arc<dyn StreamInterceptor>,
        logging as Arc<dyn StreamInterceptor>,
    ]);

    let target = with_scheme(&address, &security);
    let endpoint = Endpoint::from_shared(target.clone()).map_err(|e| {
        tracing::error!(target: "grpc_bootstrap", addr = %target, error = ?e, "Invalid URI");
        Error::InvalidUri(e)
    })?;
    let mut endpoint = config.channel().apply_to_endpoint(endpoint);
    if let ClientSecurity::Tls(tls) = &security {
        endpoint = endpoint
            .tls_config(tls.to_tonic())
            .map_err(Error::ConnectionFailed)?;
    }

    tracing::debug!(
        target: "grpc_bootstrap",
        addr = %target,
        mode = %mode,
        lazy = config.channel().lazy,
        "Creating gRPC connection"
    );

    let channel = if config.channel().lazy {
        endpoint.connect_lazy()
    } else {
        endpoint.connect().await.map_err(|e| {
            tracing::error!(
                target: "grpc_bootstrap",
                addr = %target,
                error = ?e,
                "Failed to connect to gRPC service"
            );
            Error::ConnectionFailed(e)
        })?
    };

    Ok(Connection {
        target,
        mode,
        transport: ChannelCall {
            channel,
            max_decoding_message_size: config.channel().max_decoding_message_size,
            max_encoding_message_size: config.channel().max_encoding_message_size,
        },
        unary: Arc::new(unary),
        streaming: Arc::new(streaming),
    })
}

fn with_scheme(address: &str, security: &ClientSecurity) -> String {
    if address.contains("://") {
        address.to_string()
    } else if security.is_tls() {
        format!("https://{address}")
    } else {
        format!("http://{address}")
    }
}

impl Connection {
    /// The URI that was dialed.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn mode(&self) -> TlsMode {
        self.mode
    }

    /// The raw tonic channel, bypassing every interceptor.
    pub fn channel(&self) -> Channel {
        self.transport.channel.clone()
    }

    /// Unary call with an encoded request.
    pub async fn unary(&self, method: &str, request: Bytes) -> std::result::Result<Bytes, Status> {
        self.unary_with_context(CallContext::unary(method), request)
            .await
    }

    /// Unary call with caller-provided metadata or timeout.
    pub async fn unary_with_context(
        &self,
        ctx: CallContext,
        request: Bytes,
    ) -> std::result::Result<Bytes, Status> {
        self.unary.run(ctx, request, &self.transport).await
    }

    /// Typed unary call: encodes `request` and decodes the reply with prost.
    pub async fn call<Req, Resp>(&self, method: &str, request: &Req) -> std::result::Result<Resp, Status>
    where
        Req: prost::Message,
        Resp: prost::Message + Default,
    {
        let reply = self
            .unary(method, Bytes::from(request.encode_to_vec()))
            .await?;
        Resp::decode(reply)
            .map_err(|e| Status::internal(format!("failed to decode {method} response: {e}")))
    }

    /// Client- or bidi-streaming call.
    pub async fn streaming(
        &self,
        method: &str,
        request: StreamRequest,
    ) -> std::result::Result<MessageStream, Status> {
        self.streaming_with_context(CallContext::streaming(method), request)
            .await
    }

    /// Server-streaming call: one request, a stream of replies.
    pub async fn server_streaming(
        &self,
        method: &str,
        request: Bytes,
    ) -> std::result::Result<MessageStream, Status> {
        self.streaming(method, StreamRequest::single(request)).await
    }

    pub async fn streaming_with_context(
        &self,
        ctx: CallContext,
        request: StreamRequest,
    ) -> std::result::Result<MessageStream, Status> {
        self.streaming.run(ctx, request, &self.transport).await
    }
}

/// Terminal handler that puts the call on the wire.
#[derive(Clone)]
struct ChannelCall {
    channel: Channel,
    max_decoding_message_size: usize,
    max_encoding_message_size: usize,
}

impl ChannelCall {
    async fn ready(&self) -> std::result::Result<tonic::client::Grpc<Channel>, Status> {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone())
            .max_decoding_message_size(self.max_decoding_message_size)
            .max_encoding_message_size(self.max_encoding_message_size);
        grpc.ready()
            .await
            .map_err(|e| Status::unavailable(format!("Service was not ready: {e}")))?;
        Ok(grpc)
    }
}

fn method_path(ctx: &CallContext) -> std::result::Result<PathAndQuery, Status> {
    PathAndQuery::try_from(ctx.method())
        .map_err(|e| Status::invalid_argument(format!("invalid method path {}: {e}", ctx.method())))
}

fn outbound<T>(ctx: &CallContext, message: T) -> tonic::Request<T> {
    let mut request = tonic::Request::new(message);
    *request.metadata_mut() = ctx.metadata().clone();
    if let Some(timeout) = ctx.timeout() {
        request.set_timeout(timeout);
    }
    request
}

impl UnaryHandler for ChannelCall {
    fn call(&self, ctx: CallContext, request: Bytes) -> BoxFuture<'_, std::result::Result<Bytes, Status>> {
        Box::pin(async move {
            let path = method_path(&ctx)?;
            let mut grpc = self.ready().await?;
            let response = grpc.unary(outbound(&ctx, request), path, RawCodec).await?;
            Ok(response.into_inner())
        })
    }
}

impl StreamHandler for ChannelCall {
    fn call(
        &self,
        ctx: CallContext,
        request: StreamRequest,
    ) -> BoxFuture<'_, std::result::Result<MessageStream, Status>> {
        Box::pin(async move {
            let path = method_path(&ctx)?;
            let mut grpc = self.ready().await?;
            // Outbound errors end the request stream; the server sees a half-close.
            let messages = request
                .into_stream()
                .scan((), |_, item| future::ready(item.ok()));
            let response = grpc
                .streaming(outbound(&ctx, messages), path, RawCodec)
                .await?;
            Ok(Box::pin(response.into_inner()) as MessageStream)
        })
    }
}

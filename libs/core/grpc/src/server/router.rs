use crate::call::{CallContext, MessageStream, StreamHandler, StreamRequest, UnaryHandler};
use crate::codec::RawCodec;
use crate::interceptors::{StreamChain, UnaryChain};
use bytes::Bytes;
use futures::future::BoxFuture;
use http::header::CONTENT_TYPE;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tonic::body::BoxBody;
use tonic::metadata::GRPC_CONTENT_TYPE;
use tonic::server::{Grpc, StreamingService, UnaryService};
use tonic::{Code, Status, Streaming};

#[derive(Clone)]
pub(crate) enum Route {
    Unary(Arc<dyn UnaryHandler>),
    Streaming(Arc<dyn StreamHandler>),
}

/// Method table plus the chains every call passes through.
pub(crate) struct Router {
    routes: HashMap<String, Route>,
    unary: Arc<UnaryChain>,
    streaming: Arc<StreamChain>,
    max_decoding_message_size: usize,
    max_encoding_message_size: usize,
}

/// `/pkg.Service/Method`, accepting the path with or without its leading slash.
pub(crate) fn route_key(method: &str) -> String {
    if method.starts_with('/') {
        method.to_string()
    } else {
        format!("/{method}")
    }
}

impl Router {
    pub(crate) fn new(
        unary: UnaryChain,
        streaming: StreamChain,
        max_decoding_message_size: usize,
        max_encoding_message_size: usize,
    ) -> Self {
        Self {
            routes: HashMap::new(),
            unary: Arc::new(unary),
            streaming: Arc::new(streaming),
            max_decoding_message_size,
            max_encoding_message_size,
        }
    }

    pub(crate) fn insert(&mut self, method: &str, route: Route) {
        self.routes.insert(route_key(method), route);
    }

    pub(crate) fn len(&self) -> usize {
        self.routes.len()
    }

    fn grpc(&self) -> Grpc<RawCodec> {
        Grpc::new(RawCodec).apply_max_message_size_config(
            Some(self.max_decoding_message_size),
            Some(self.max_encoding_message_size),
        )
    }

    pub(crate) async fn dispatch<B>(
        &self,
        request: http::Request<B>,
        peer: Option<SocketAddr>,
    ) -> http::Response<BoxBody>
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>> + Send,
    {
        let method = request.uri().path().to_string();
        match self.routes.get(&method) {
            Some(Route::Unary(handler)) => {
                let service = UnaryCall {
                    chain: self.unary.clone(),
                    handler: handler.clone(),
                    method,
                    peer,
                };
                self.grpc().unary(service, request).await
            }
            Some(Route::Streaming(handler)) => {
                let service = StreamingCall {
                    chain: self.streaming.clone(),
                    handler: handler.clone(),
                    method,
                    peer,
                };
                self.grpc().streaming(service, request).await
            }
            None => {
                tracing::debug!(target: "grpc_bootstrap", %method, "no handler registered");
                unimplemented()
            }
        }
    }
}

fn unimplemented() -> http::Response<BoxBody> {
    let mut response = http::Response::new(tonic::codegen::empty_body());
    let headers = response.headers_mut();
    headers.insert(Status::GRPC_STATUS, (Code::Unimplemented as i32).into());
    headers.insert(CONTENT_TYPE, GRPC_CONTENT_TYPE);
    response
}

fn context(ctx: CallContext, metadata: tonic::metadata::MetadataMap, peer: Option<SocketAddr>) -> CallContext {
    let ctx = ctx.with_metadata(metadata);
    match peer {
        Some(peer) => ctx.with_peer(peer),
        None => ctx,
    }
}

struct UnaryCall {
    chain: Arc<UnaryChain>,
    handler: Arc<dyn UnaryHandler>,
    method: String,
    peer: Option<SocketAddr>,
}

impl UnaryService<Bytes> for UnaryCall {
    type Response = Bytes;
    type Future = BoxFuture<'static, Result<tonic::Response<Bytes>, Status>>;

    fn call(&mut self, request: tonic::Request<Bytes>) -> Self::Future {
        let chain = self.chain.clone();
        let handler = self.handler.clone();
        let (metadata, _, message) = request.into_parts();
        let ctx = context(CallContext::unary(self.method.as_str()), metadata, self.peer);

        Box::pin(async move {
            let reply = chain.run(ctx, message, handler.as_ref()).await?;
            Ok(tonic::Response::new(reply))
        })
    }
}

struct StreamingCall {
    chain: Arc<StreamChain>,
    handler: Arc<dyn StreamHandler>,
    method: String,
    peer: Option<SocketAddr>,
}

impl StreamingService<Bytes> for StreamingCall {
    type Response = Bytes;
    type ResponseStream = MessageStream;
    type Future = BoxFuture<'static, Result<tonic::Response<MessageStream>, Status>>;

    fn call(&mut self, request: tonic::Request<Streaming<Bytes>>) -> Self::Future {
        let chain = self.chain.clone();
        let handler = self.handler.clone();
        let (metadata, _, inbound) = request.into_parts();
        let ctx = context(CallContext::streaming(self.method.as_str()), metadata, self.peer);

        Box::pin(async move {
            let replies = chain
                .run(ctx, StreamRequest::live(inbound), handler.as_ref())
                .await?;
            Ok(tonic::Response::new(replies))
        })
    }
}

use super::{StreamInterceptor, StreamNext, UnaryInterceptor, UnaryNext};
use crate::call::{CallContext, MessageStream, StreamRequest};
use async_trait::async_trait;
use bytes::Bytes;
use tonic::Status;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Stamps a UUID v4 `x-request-id` on calls that do not carry one yet.
///
/// Pair it with [`fields::metadata`](super::fields::metadata) to get the id on
/// every log record.
#[derive(Clone, Debug, Default)]
pub struct RequestIdInterceptor;

impl RequestIdInterceptor {
    pub fn new() -> Self {
        Self
    }

    fn stamp(ctx: &mut CallContext) {
        if ctx.metadata().contains_key(REQUEST_ID_HEADER) {
            return;
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        match request_id.parse() {
            Ok(value) => {
                ctx.metadata_mut().insert(REQUEST_ID_HEADER, value);
                tracing::debug!(
                    target: "grpc_bootstrap",
                    request_id = %request_id,
                    method = ctx.method(),
                    "assigned request id"
                );
            }
            Err(e) => {
                tracing::warn!(target: "grpc_bootstrap", error = %e, "invalid request id metadata");
            }
        }
    }
}

#[async_trait]
impl UnaryInterceptor for RequestIdInterceptor {
    async fn intercept(
        &self,
        mut ctx: CallContext,
        request: Bytes,
        next: UnaryNext<'_>,
    ) -> Result<Bytes, Status> {
        Self::stamp(&mut ctx);
        next.run(ctx, request).await
    }
}

#[async_trait]
impl StreamInterceptor for RequestIdInterceptor {
    async fn intercept(
        &self,
        mut ctx: CallContext,
        request: StreamRequest,
        next: StreamNext<'_>,
    ) -> Result<MessageStream, Status> {
        Self::stamp(&mut ctx);
        next.run(ctx, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptors::UnaryChain;

    fn echo_request_id() -> impl crate::call::UnaryHandler {
        |ctx: CallContext, _request: Bytes| async move {
            let id = ctx
                .metadata()
                .get(REQUEST_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string();
            Ok::<_, Status>(Bytes::from(id))
        }
    }

    #[tokio::test]
    async fn test_assigns_uuid() {
        let chain = UnaryChain::default().with(RequestIdInterceptor::new());
        let reply = chain
            .run(CallContext::unary("/s.S/M"), Bytes::new(), &echo_request_id())
            .await
            .unwrap();

        let id = std::str::from_utf8(&reply).unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn test_keeps_existing_id() {
        let chain = UnaryChain::default().with(RequestIdInterceptor::new());
        let mut ctx = CallContext::unary("/s.S/M");
        ctx.metadata_mut()
            .insert(REQUEST_ID_HEADER, "caller-chosen".parse().unwrap());

        let reply = chain.run(ctx, Bytes::new(), &echo_request_id()).await.unwrap();
        assert_eq!(reply, Bytes::from_static(b"caller-chosen"));
    }
}

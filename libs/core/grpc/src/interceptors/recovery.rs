use super::{StreamInterceptor, StreamNext, UnaryInterceptor, UnaryNext};
use crate::call::{CallContext, MessageStream, StreamRequest};
use crate::logger::{Field, LogRecord, Logger, Severity, SharedLogger};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{FutureExt, StreamExt};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use tonic::Status;

const RECOVERED_MESSAGE: &str = "recovered from panic in handler";

/// Server interceptor that contains panics raised by the inner chain.
///
/// The panicking call fails with `Internal`; the panic value is logged at
/// Error and never reaches the caller. Other calls are unaffected. Panics
/// while producing items of a streaming response end that stream the same way.
#[derive(Clone)]
pub struct RecoveryInterceptor {
    logger: SharedLogger,
}

impl RecoveryInterceptor {
    pub fn new(logger: SharedLogger) -> Self {
        Self { logger }
    }
}

impl fmt::Debug for RecoveryInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryInterceptor").finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn recovered(logger: &dyn Logger, method: &str, panic: Box<dyn Any + Send>) -> Status {
    let value = panic_message(panic.as_ref());
    logger.log(
        LogRecord::new(Severity::Error, RECOVERED_MESSAGE)
            .with_field(Field::new("method", method))
            .with_field(Field::new("panic", &value)),
    );
    tracing::debug!(target: "grpc_bootstrap", method, panic = %value, "handler panic contained");
    Status::internal("internal server error")
}

#[async_trait]
impl UnaryInterceptor for RecoveryInterceptor {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: Bytes,
        next: UnaryNext<'_>,
    ) -> Result<Bytes, Status> {
        let method = ctx.method().to_owned();
        // Deferred into the future so panics while building the inner call are caught too.
        let call = async move { next.run(ctx, request).await };

        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(recovered(self.logger.as_ref(), &method, panic)),
        }
    }
}

#[async_trait]
impl StreamInterceptor for RecoveryInterceptor {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: StreamRequest,
        next: StreamNext<'_>,
    ) -> Result<MessageStream, Status> {
        let method = ctx.method().to_owned();
        let call = async move { next.run(ctx, request).await };

        let stream = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result?,
            Err(panic) => return Err(recovered(self.logger.as_ref(), &method, panic)),
        };

        let logger = self.logger.clone();
        let guarded = AssertUnwindSafe(stream)
            .catch_unwind()
            .map(move |item| match item {
                Ok(item) => item,
                Err(panic) => Err(recovered(logger.as_ref(), &method, panic)),
            });
        Ok(Box::pin(guarded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::UnaryHandler;
    use crate::interceptors::{StreamChain, UnaryChain};
    use crate::logger::RecordingLogger;
    use futures::stream;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tonic::Code;

    fn panicking() -> impl UnaryHandler {
        |_ctx: CallContext, request: Bytes| async move {
            if request.is_empty() {
                panic!("handler exploded");
            }
            Ok::<_, Status>(request)
        }
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_and_is_logged() {
        let logger = Arc::new(RecordingLogger::new());
        let chain = UnaryChain::default().with(RecoveryInterceptor::new(logger.clone()));

        let err = chain
            .run(CallContext::unary("/pkg.Svc/Boom"), Bytes::new(), &panicking())
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Internal);
        assert!(!err.message().contains("exploded"));

        let records = logger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, Severity::Error);
        assert_eq!(records[0].message, RECOVERED_MESSAGE);
        assert_eq!(records[0].field("method"), Some("/pkg.Svc/Boom"));
        assert_eq!(records[0].field("panic"), Some("handler exploded"));
    }

    #[tokio::test]
    async fn test_later_calls_succeed() {
        let logger = Arc::new(RecordingLogger::new());
        let chain = UnaryChain::default().with(RecoveryInterceptor::new(logger.clone()));
        let handler = panicking();

        assert!(chain.run(CallContext::unary("/s.S/M"), Bytes::new(), &handler).await.is_err());
        let reply = chain
            .run(CallContext::unary("/s.S/M"), Bytes::from_static(b"fine"), &handler)
            .await
            .unwrap();
        assert_eq!(reply, Bytes::from_static(b"fine"));
        assert_eq!(logger.len(), 1);
    }

    #[tokio::test]
    async fn test_synchronous_panic_in_handler_is_caught() {
        let logger = Arc::new(RecordingLogger::new());
        let chain = UnaryChain::default().with(RecoveryInterceptor::new(logger.clone()));
        let handler = |_ctx: CallContext, _request: Bytes| -> futures::future::Ready<Result<Bytes, Status>> {
            std::panic::panic_any(String::from("before the future"))
        };

        let err = chain
            .run(CallContext::unary("/s.S/M"), Bytes::new(), &handler)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Internal);
        assert_eq!(logger.records()[0].field("panic"), Some("before the future"));
    }

    /// A fault in B with chain [recovery, A, B] is contained by recovery, after A ran.
    #[tokio::test]
    async fn test_contains_faults_from_inner_interceptors() {
        struct MarkA(Arc<AtomicBool>);
        struct PanicB;

        #[async_trait]
        impl UnaryInterceptor for MarkA {
            async fn intercept(
                &self,
                ctx: CallContext,
                request: Bytes,
                next: UnaryNext<'_>,
            ) -> Result<Bytes, Status> {
                self.0.store(true, Ordering::SeqCst);
                next.run(ctx, request).await
            }
        }

        #[async_trait]
        impl UnaryInterceptor for PanicB {
            async fn intercept(
                &self,
                _ctx: CallContext,
                _request: Bytes,
                _next: UnaryNext<'_>,
            ) -> Result<Bytes, Status> {
                panic!("interceptor B failed")
            }
        }

        let logger = Arc::new(RecordingLogger::new());
        let a_ran = Arc::new(AtomicBool::new(false));
        let chain = UnaryChain::default()
            .with(RecoveryInterceptor::new(logger.clone()))
            .with(MarkA(a_ran.clone()))
            .with(PanicB);

        let handler = |_ctx: CallContext, request: Bytes| async move { Ok::<_, Status>(request) };
        let err = chain
            .run(CallContext::unary("/s.S/M"), Bytes::from_static(b"x"), &handler)
            .await
            .unwrap_err();

        assert!(a_ran.load(Ordering::SeqCst));
        assert_eq!(err.code(), Code::Internal);
        assert_eq!(logger.records()[0].field("panic"), Some("interceptor B failed"));
    }

    #[tokio::test]
    async fn test_panic_inside_response_stream() {
        let logger = Arc::new(RecordingLogger::new());
        let chain = StreamChain::default().with(RecoveryInterceptor::new(logger.clone()));
        let handler = |_ctx: CallContext, _request: StreamRequest| async move {
            let items = stream::iter(0..3).map(|n| {
                if n == 1 {
                    panic!("second item");
                }
                Ok::<_, Status>(Bytes::from(vec![n as u8]))
            });
            Ok::<MessageStream, Status>(Box::pin(items))
        };

        let stream = chain
            .run(CallContext::streaming("/s.S/List"), StreamRequest::Buffered(Vec::new()), &handler)
            .await
            .unwrap();
        let items: Vec<_> = stream.collect().await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert_eq!(items[1].as_ref().unwrap_err().code(), Code::Internal);
        assert_eq!(logger.len(), 1);
    }

    #[tokio::test]
    async fn test_panic_while_opening_stream() {
        let logger = Arc::new(RecordingLogger::new());
        let chain = StreamChain::default().with(RecoveryInterceptor::new(logger.clone()));
        let handler = |_ctx: CallContext, _request: StreamRequest| async move {
            if true {
                panic!("cannot open");
            }
            Ok::<MessageStream, Status>(Box::pin(stream::empty::<Result<Bytes, Status>>()))
        };

        let result = chain
            .run(CallContext::streaming("/s.S/List"), StreamRequest::Buffered(Vec::new()), &handler)
            .await;
        assert_eq!(result.err().map(|status| status.code()), Some(Code::Internal));
        assert_eq!(logger.len(), 1);
    }
}

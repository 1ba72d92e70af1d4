use super::{StreamInterceptor, StreamNext, UnaryInterceptor, UnaryNext};
use crate::call::{CallContext, MessageStream, StreamRequest};
use crate::logger::{Field, LogRecord, Severity, SharedLogger};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tonic::{Code, Status};

/// Builds one field of a call's log record from its context.
pub type FieldExtractor = Arc<dyn Fn(&CallContext) -> Field + Send + Sync>;

/// Severity policy: only failures attributable to the service or its
/// reachability are errors.
pub fn severity_for(code: Code) -> Severity {
    match code {
        Code::Internal | Code::Unavailable => Severity::Error,
        _ => Severity::Info,
    }
}

/// Emits one record per call with its latency, method and status code.
///
/// Message format: `latency=<elapsed> <method> <code>`, with `, err=<message>`
/// appended when the call failed. Fields come from the configured extractors,
/// in order, evaluated before the call proceeds.
#[derive(Clone)]
pub struct LoggingInterceptor {
    logger: SharedLogger,
    extractors: Vec<FieldExtractor>,
}

impl LoggingInterceptor {
    pub fn new(logger: SharedLogger) -> Self {
        Self {
            logger,
            extractors: Vec::new(),
        }
    }

    pub fn with_field<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&CallContext) -> Field + Send + Sync + 'static,
    {
        self.extractors.push(Arc::new(extractor));
        self
    }

    pub fn with_fields(mut self, extractors: impl IntoIterator<Item = FieldExtractor>) -> Self {
        self.extractors.extend(extractors);
        self
    }

    fn fields(&self, ctx: &CallContext) -> Vec<Field> {
        self.extractors.iter().map(|extract| extract(ctx)).collect()
    }
}

impl fmt::Debug for LoggingInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingInterceptor")
            .field("extractors", &self.extractors.len())
            .finish()
    }
}

/// Canonical gRPC name of `code`, as other gRPC implementations print it.
pub fn code_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "Canceled",
        Code::Unknown => "Unknown",
        Code::InvalidArgument => "InvalidArgument",
        Code::DeadlineExceeded => "DeadlineExceeded",
        Code::NotFound => "NotFound",
        Code::AlreadyExists => "AlreadyExists",
        Code::PermissionDenied => "PermissionDenied",
        Code::ResourceExhausted => "ResourceExhausted",
        Code::FailedPrecondition => "FailedPrecondition",
        Code::Aborted => "Aborted",
        Code::OutOfRange => "OutOfRange",
        Code::Unimplemented => "Unimplemented",
        Code::Internal => "Internal",
        Code::Unavailable => "Unavailable",
        Code::DataLoss => "DataLoss",
        Code::Unauthenticated => "Unauthenticated",
    }
}

fn call_record(method: &str, elapsed: Duration, status: Option<&Status>, fields: Vec<Field>) -> LogRecord {
    let latency = format!("{elapsed:?}");
    let (code, message) = match status {
        None => (
            Code::Ok,
            format!("latency={latency:<12} {method} {}", code_name(Code::Ok)),
        ),
        Some(status) => (
            status.code(),
            format!(
                "latency={latency:<12} {method} {}, err={}",
                code_name(status.code()),
                status.message()
            ),
        ),
    };
    LogRecord::new(severity_for(code), message).with_fields(fields)
}

#[async_trait]
impl UnaryInterceptor for LoggingInterceptor {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: Bytes,
        next: UnaryNext<'_>,
    ) -> Result<Bytes, Status> {
        if !self.logger.enabled() {
            return next.run(ctx, request).await;
        }
        let method = ctx.method().to_owned();
        let fields = self.fields(&ctx);
        let started = Instant::now();

        let result = next.run(ctx, request).await;

        let status = result.as_ref().err();
        self.logger
            .log(call_record(&method, started.elapsed(), status, fields));
        result
    }
}

#[async_trait]
impl StreamInterceptor for LoggingInterceptor {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: StreamRequest,
        next: StreamNext<'_>,
    ) -> Result<MessageStream, Status> {
        if !self.logger.enabled() {
            return next.run(ctx, request).await;
        }
        let pending = PendingRecord {
            logger: self.logger.clone(),
            method: ctx.method().to_owned(),
            fields: self.fields(&ctx),
            started: Instant::now(),
        };

        match next.run(ctx, request).await {
            Ok(stream) => Ok(Box::pin(LoggedStream {
                inner: stream,
                pending: Some(pending),
            })),
            Err(status) => {
                pending.emit(Some(&status));
                Err(status)
            }
        }
    }
}

struct PendingRecord {
    logger: SharedLogger,
    method: String,
    fields: Vec<Field>,
    started: Instant,
}

impl PendingRecord {
    fn emit(self, status: Option<&Status>) {
        let record = call_record(&self.method, self.started.elapsed(), status, self.fields);
        self.logger.log(record);
    }
}

/// Response stream that logs the call once it terminates.
///
/// Dropping the stream before it ends counts as a cancelled call.
struct LoggedStream {
    inner: MessageStream,
    pending: Option<PendingRecord>,
}

impl Stream for LoggedStream {
    type Item = Result<Bytes, Status>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = this.inner.as_mut().poll_next(cx);
        match &polled {
            Poll::Ready(None) => {
                if let Some(pending) = this.pending.take() {
                    pending.emit(None);
                }
            }
            Poll::Ready(Some(Err(status))) => {
                if let Some(pending) = this.pending.take() {
                    pending.emit(Some(status));
                }
            }
            _ => {}
        }
        polled
    }
}

impl Drop for LoggedStream {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.emit(Some(&Status::cancelled("stream dropped before completion")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptors::{StreamChain, UnaryChain};
    use crate::logger::{NoopLogger, RecordingLogger};
    use futures::{StreamExt, stream};

    fn chain(logger: &Arc<RecordingLogger>) -> UnaryChain {
        UnaryChain::default().with(
            LoggingInterceptor::new(logger.clone())
                .with_field(|ctx: &CallContext| Field::new("service", ctx.service()))
                .with_field(|_: &CallContext| Field::new("static", "yes")),
        )
    }

    async fn call_with(code: Code) -> LogRecord {
        let logger = Arc::new(RecordingLogger::new());
        let handler = move |_ctx: CallContext, request: Bytes| async move {
            if code == Code::Ok {
                Ok(request)
            } else {
                Err(Status::new(code, "boom"))
            }
        };
        let _ = chain(&logger)
            .run(CallContext::unary("/pkg.Svc/Do"), Bytes::new(), &handler)
            .await;

        let mut records = logger.records();
        assert_eq!(records.len(), 1);
        records.remove(0)
    }

    #[test]
    fn test_severity_policy() {
        assert_eq!(severity_for(Code::Internal), Severity::Error);
        assert_eq!(severity_for(Code::Unavailable), Severity::Error);
        for code in [
            Code::Ok,
            Code::InvalidArgument,
            Code::NotFound,
            Code::DeadlineExceeded,
            Code::PermissionDenied,
            Code::Unimplemented,
            Code::Cancelled,
        ] {
            assert_eq!(severity_for(code), Severity::Info, "{code:?}");
        }
    }

    #[test]
    fn test_code_names_are_canonical() {
        assert_eq!(code_name(Code::Ok), "OK");
        assert_eq!(code_name(Code::Cancelled), "Canceled");
        assert_eq!(code_name(Code::DeadlineExceeded), "DeadlineExceeded");
        assert_eq!(code_name(Code::Unauthenticated), "Unauthenticated");
    }

    #[tokio::test]
    async fn test_disabled_logger_skips_extractors() {
        let extracted = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = extracted.clone();
        let chain = UnaryChain::default().with(
            LoggingInterceptor::new(Arc::new(NoopLogger)).with_field(move |_: &CallContext| {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Field::new("k", "v")
            }),
        );
        let handler = |_ctx: CallContext, request: Bytes| async move { Ok::<_, Status>(request) };

        let reply = chain
            .run(CallContext::unary("/pkg.Svc/Do"), Bytes::from_static(b"x"), &handler)
            .await
            .unwrap();
        assert_eq!(reply, Bytes::from_static(b"x"));
        assert_eq!(extracted.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_success_record() {
        let record = call_with(Code::Ok).await;
        assert_eq!(record.severity, Severity::Info);
        assert!(record.message.starts_with("latency="));
        assert!(record.message.ends_with("/pkg.Svc/Do OK"));
        assert!(!record.message.contains("err="));
        assert_eq!(
            record.fields,
            vec![Field::new("service", "pkg.Svc"), Field::new("static", "yes")]
        );
    }

    #[tokio::test]
    async fn test_failure_records() {
        let record = call_with(Code::Unavailable).await;
        assert_eq!(record.severity, Severity::Error);
        assert!(record.message.ends_with("/pkg.Svc/Do Unavailable, err=boom"));

        let record = call_with(Code::Internal).await;
        assert_eq!(record.severity, Severity::Error);

        let record = call_with(Code::NotFound).await;
        assert_eq!(record.severity, Severity::Info);
        assert!(record.message.ends_with("NotFound, err=boom"));
    }

    #[tokio::test]
    async fn test_stream_logged_when_finished() {
        let logger = Arc::new(RecordingLogger::new());
        let chain = StreamChain::default().with(LoggingInterceptor::new(logger.clone()));
        let handler = |_ctx: CallContext, request: StreamRequest| async move {
            Ok::<_, Status>(request.into_stream())
        };

        let stream = chain
            .run(
                CallContext::streaming("/pkg.Svc/List"),
                StreamRequest::buffered([Bytes::from_static(b"1"), Bytes::from_static(b"2")]),
                &handler,
            )
            .await
            .unwrap();
        assert!(logger.is_empty());

        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);

        let records = logger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, Severity::Info);
        assert!(records[0].message.ends_with("/pkg.Svc/List OK"));
    }

    #[tokio::test]
    async fn test_stream_error_item_is_logged_once() {
        let logger = Arc::new(RecordingLogger::new());
        let chain = StreamChain::default().with(LoggingInterceptor::new(logger.clone()));
        let handler = |_ctx: CallContext, _request: StreamRequest| async move {
            let items = vec![Ok(Bytes::from_static(b"1")), Err(Status::internal("broke"))];
            Ok::<MessageStream, Status>(Box::pin(stream::iter(items)))
        };

        let stream = chain
            .run(CallContext::streaming("/pkg.Svc/List"), StreamRequest::Buffered(Vec::new()), &handler)
            .await
            .unwrap();
        let _: Vec<_> = stream.collect().await;

        let records = logger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, Severity::Error);
        assert!(records[0].message.ends_with("Internal, err=broke"));
    }

    #[tokio::test]
    async fn test_dropped_stream_is_cancelled() {
        let logger = Arc::new(RecordingLogger::new());
        let chain = StreamChain::default().with(LoggingInterceptor::new(logger.clone()));
        let handler = |_ctx: CallContext, _request: StreamRequest| async move {
            Ok::<MessageStream, Status>(Box::pin(stream::pending::<Result<Bytes, Status>>()))
        };

        let stream = chain
            .run(CallContext::streaming("/pkg.Svc/Watch"), StreamRequest::Buffered(Vec::new()), &handler)
            .await
            .unwrap();
        drop(stream);

        let records = logger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, Severity::Info);
        assert!(records[0].message.contains("Canceled, err="));
    }

    #[tokio::test]
    async fn test_failed_open_is_logged_immediately() {
        let logger = Arc::new(RecordingLogger::new());
        let chain = StreamChain::default().with(LoggingInterceptor::new(logger.clone()));
        let handler = |_ctx: CallContext, _request: StreamRequest| async move {
            Err::<MessageStream, _>(Status::unavailable("no backend"))
        };

        let result = chain
            .run(CallContext::streaming("/pkg.Svc/Watch"), StreamRequest::Buffered(Vec::new()), &handler)
            .await;
        assert!(result.is_err());

        let records = logger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, Severity::Error);
    }
}

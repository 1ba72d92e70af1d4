//! Server factory.
//!
//! [`new_server`] resolves server credentials, announces the security mode and
//! builds the `[recovery, custom...]` chains. Handlers are registered by full
//! method path and receive encoded messages.
//!
//! ```ignore
//! use core_config::FromEnv;
//! use grpc_bootstrap::{ServerConfig, new_server};
//!
//! let config = ServerConfig::from_env()?;
//! let listener = tokio::net::TcpListener::bind(config.socket_addr()?).await?;
//!
//! let mut server = new_server(config)?;
//! server
//!     .add_unary("/tasks.v1.Tasks/GetTask", |ctx, request| async move { get_task(ctx, request).await })
//!     .add_streaming("/tasks.v1.Tasks/Watch", |ctx, requests| async move { watch(ctx, requests).await });
//!
//! server.serve_with_shutdown(listener, tokio::signal::ctrl_c()).await?;
//! ```

mod config;
mod router;

pub use config::{ServerConfig, ServerConfigBuilder};

use crate::call::{StreamHandler, UnaryHandler};
use crate::credentials::{ServerSecurity, TlsMode, resolve_server};
use crate::error::{Error, Result};
use crate::interceptors::{RecoveryInterceptor, StreamInterceptor, UnaryInterceptor};
use crate::logger::{Field, LogRecord, NoopLogger, Severity, SharedLogger};
use hyper::server::conn::http2;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use router::{Route, Router};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;

const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// A configured server waiting for handlers and a listener.
pub struct Server {
    security: ServerSecurity,
    logger: SharedLogger,
    router: Router,
    tcp_nodelay: bool,
    http2_keep_alive_interval: Option<Duration>,
    http2_keep_alive_timeout: Duration,
    max_concurrent_streams: Option<u32>,
    shutdown_grace: Duration,
}

/// Build a server from `config`.
///
/// Credential problems fail here, before anything is bound. Running without
/// transport security is allowed but announced at Warn, both to the injected
/// logger and to `tracing`.
pub fn new_server(config: ServerConfig) -> Result<Server> {
    let security = resolve_server(&config.credentials).map_err(Error::ServerCredentials)?;
    let logger: SharedLogger = config.logger.unwrap_or_else(|| Arc::new(NoopLogger));

    let notice = mode_notice(security.mode());
    trace_notice(&notice, security.mode());
    logger.log(notice);

    let recovery = Arc::new(RecoveryInterceptor::new(logger.clone()));
    let unary = config
        .interceptors
        .unary_chain(vec![recovery.clone() as Arc<dyn UnaryInterceptor>]);
    let streaming = config
        .interceptors
        .stream_chain(vec![recovery as Arc<dyn StreamInterceptor>]);

    Ok(Server {
        security,
        logger,
        router: Router::new(
            unary,
            streaming,
            config.max_decoding_message_size,
            config.max_encoding_message_size,
        ),
        tcp_nodelay: config.tcp_nodelay,
        http2_keep_alive_interval: config.http2_keep_alive_interval,
        http2_keep_alive_timeout: config.http2_keep_alive_timeout,
        max_concurrent_streams: config.max_concurrent_streams,
        shutdown_grace: config.shutdown_grace,
    })
}

fn mode_notice(mode: TlsMode) -> LogRecord {
    let record = match mode {
        TlsMode::Insecure => LogRecord::new(
            Severity::Warn,
            "grpc server running without transport security",
        ),
        TlsMode::ServerTls => LogRecord::new(Severity::Info, "grpc server using TLS"),
        TlsMode::MutualTls => LogRecord::new(
            Severity::Info,
            "grpc server using mutual TLS, client certificates required",
        ),
    };
    record.with_field(Field::new("mode", mode))
}

fn trace_notice(notice: &LogRecord, mode: TlsMode) {
    let message = notice.message.as_str();
    if notice.severity == Severity::Warn {
        tracing::warn!(target: "grpc_bootstrap", %mode, "{message}");
    } else {
        tracing::info!(target: "grpc_bootstrap", %mode, "{message}");
    }
}

impl Server {
    pub fn mode(&self) -> TlsMode {
        self.security.mode()
    }

    /// Register a unary handler for `method` (`/pkg.Service/Method`).
    /// Registering the same method again replaces the handler.
    pub fn add_unary<H>(&mut self, method: &str, handler: H) -> &mut Self
    where
        H: UnaryHandler + 'static,
    {
        self.router.insert(method, Route::Unary(Arc::new(handler)));
        self
    }

    /// Register a client-, server- or bidi-streaming handler for `method`.
    pub fn add_streaming<H>(&mut self, method: &str, handler: H) -> &mut Self
    where
        H: StreamHandler + 'static,
    {
        self.router.insert(method, Route::Streaming(Arc::new(handler)));
        self
    }

    /// Serve until the returned future is dropped. Accept errors are logged
    /// and accepting continues.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        self.serve_with_shutdown(listener, std::future::pending::<()>())
            .await
    }

    /// Serve until `signal` completes, then stop accepting and let open
    /// connections finish their in-flight calls.
    ///
    /// Draining is bounded by the configured shutdown grace; connections still
    /// open after it are left to finish on their own tasks.
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let addr = listener.local_addr()?;
        let connection = Arc::new(ConnectionSettings {
            acceptor: self.security.tls_config().map(TlsAcceptor::from),
            router: self.router,
            http2_keep_alive_interval: self.http2_keep_alive_interval,
            http2_keep_alive_timeout: self.http2_keep_alive_timeout,
            max_concurrent_streams: self.max_concurrent_streams,
        });

        tracing::info!(
            target: "grpc_bootstrap",
            %addr,
            mode = %self.security.mode(),
            methods = connection.router.len(),
            "gRPC server starting"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::pin!(signal);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(target: "grpc_bootstrap", error = %e, "Failed to accept connection");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        continue;
                    }
                },
                () = &mut signal => break,
            };

            if let Err(e) = stream.set_nodelay(self.tcp_nodelay) {
                tracing::debug!(target: "grpc_bootstrap", %peer, error = %e, "Failed to set TCP_NODELAY");
            }

            let connection = connection.clone();
            let shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                connection.handle(stream, peer, shutdown).await;
            });
        }

        tracing::info!(target: "grpc_bootstrap", %addr, "gRPC server shutting down");
        drop(listener);
        let _ = shutdown_tx.send(true);
        drop(shutdown_rx);
        // Resolves once every connection task has dropped its receiver.
        if tokio::time::timeout(self.shutdown_grace, shutdown_tx.closed())
            .await
            .is_err()
        {
            tracing::warn!(
                target: "grpc_bootstrap",
                %addr,
                grace = ?self.shutdown_grace,
                open_connections = shutdown_tx.receiver_count(),
                "Shutdown grace elapsed with connections still open"
            );
        }

        self.logger.log(
            LogRecord::new(Severity::Info, "grpc server stopped")
                .with_field(Field::new("addr", addr)),
        );
        Ok(())
    }
}

/// Everything a connection task needs, shared across all of them.
struct ConnectionSettings {
    acceptor: Option<TlsAcceptor>,
    router: Router,
    http2_keep_alive_interval: Option<Duration>,
    http2_keep_alive_timeout: Duration,
    max_concurrent_streams: Option<u32>,
}

impl ConnectionSettings {
    async fn handle(self: Arc<Self>, stream: TcpStream, peer: SocketAddr, shutdown: watch::Receiver<bool>) {
        match &self.acceptor {
            None => self.clone().serve_io(stream, peer, shutdown).await,
            Some(acceptor) => {
                match tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
                    Ok(Ok(tls)) => self.clone().serve_io(tls, peer, shutdown).await,
                    Ok(Err(e)) => {
                        tracing::debug!(target: "grpc_bootstrap", %peer, error = %e, "TLS handshake failed");
                    }
                    Err(_) => {
                        tracing::debug!(target: "grpc_bootstrap", %peer, "TLS handshake timed out");
                    }
                }
            }
        }
    }

    async fn serve_io<I>(self: Arc<Self>, io: I, peer: SocketAddr, mut shutdown: watch::Receiver<bool>)
    where
        I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut builder = http2::Builder::new(TokioExecutor::new());
        builder
            .timer(TokioTimer::new())
            .max_concurrent_streams(self.max_concurrent_streams)
            .keep_alive_interval(self.http2_keep_alive_interval)
            .keep_alive_timeout(self.http2_keep_alive_timeout);

        let settings = self.clone();
        let service = service_fn(move |request: http::Request<hyper::body::Incoming>| {
            let settings = settings.clone();
            async move { Ok::<_, Infallible>(settings.router.dispatch(request, Some(peer)).await) }
        });

        let conn = builder.serve_connection(TokioIo::new(io), service);
        tokio::pin!(conn);

        let result = tokio::select! {
            result = conn.as_mut() => result,
            _ = shutdown.changed() => {
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        };

        if let Err(e) = result {
            tracing::debug!(target: "grpc_bootstrap", %peer, error = %e, "Connection closed with error");
        }
    }
}

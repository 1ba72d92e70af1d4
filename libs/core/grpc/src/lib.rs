//! # gRPC Bootstrap
//!
//! Shared construction of gRPC clients and servers: transport security,
//! interceptor chains, retries, call logging and panic recovery.
//!
//! ## Features
//!
//! - **Credentials**: plaintext, server TLS or mutual TLS resolved from PEM
//!   paths, with every file validated before anything connects or listens
//! - **Interceptor chains**: ordered middleware for unary and streaming calls,
//!   first interceptor outermost; chains nest
//! - **Retry**: linear backoff with a per-attempt timeout on transient codes
//! - **Logging**: one record per call, Error for `Internal`/`Unavailable`
//! - **Recovery**: handler panics become `Internal` and the server keeps serving
//!
//! ## Quick Start
//!
//! ### Client
//! ```ignore
//! use grpc_bootstrap::{ClientConfig, ClientCredentialsConfig, RetryOptions, TracingLogger, new_connection};
//! use std::sync::Arc;
//!
//! let config = ClientConfig::builder()
//!     .credentials(
//!         ClientCredentialsConfig::new()
//!             .with_ca("/etc/tls/ca.pem")
//!             .with_identity("/etc/tls/client.pem", "/etc/tls/client.key"),
//!     )
//!     .retry(RetryOptions::new().with_max_retries(3))
//!     .logger(Arc::new(TracingLogger))
//!     .build();
//!
//! let conn = new_connection("tasks.internal:50051", &config).await?;
//! let task: Task = conn.call("/tasks.v1.Tasks/GetTask", &GetTaskRequest { id }).await?;
//! ```
//!
//! ### Server
//! ```ignore
//! use core_config::FromEnv;
//! use grpc_bootstrap::{ServerConfig, new_server};
//!
//! let config = ServerConfig::from_env()?;
//! let listener = tokio::net::TcpListener::bind(config.socket_addr()?).await?;
//! let mut server = new_server(config)?;
//! server.add_unary("/tasks.v1.Tasks/GetTask", get_task);
//! server.serve(listener).await?;
//! ```

pub mod call;
pub mod client;
pub mod codec;
pub mod credentials;
pub mod error;
pub mod interceptors;
pub mod logger;
pub mod server;

// Re-export main types and functions for convenience
pub use call::{CallContext, CallKind, MessageStream, StreamHandler, StreamRequest, UnaryHandler};
pub use client::{ChannelConfig, ClientConfig, ClientConfigBuilder, Connection, new_connection};
pub use codec::RawCodec;
pub use credentials::{ClientCredentialsConfig, ServerCredentialsConfig, TlsMode};
pub use error::{CredentialError, CredentialErrorKind, Error, Result};
pub use logger::{Field, LogRecord, Logger, NoopLogger, RecordingLogger, Severity, SharedLogger, TracingLogger};
pub use server::{Server, ServerConfig, ServerConfigBuilder, new_server};

// Re-export interceptors for convenience
pub use interceptors::{
    InterceptorSet, LoggingInterceptor, RecoveryInterceptor, RequestIdInterceptor, RetryInterceptor,
    RetryOptions, StreamChain, StreamInterceptor, UnaryChain, UnaryInterceptor,
};

use super::TlsMode;
use super::pem::{load_ca, load_key_pair, present};
use crate::error::CredentialError;
use core_config::{ConfigError, FromEnv, env_optional};
use rustls::crypto::{CryptoProvider, ring};
use rustls::server::WebPkiClientVerifier;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Server-side credential configuration.
///
/// Which paths are present selects the mode:
/// - none: plaintext
/// - cert + key: server-only TLS
/// - CA + cert + key: mutual TLS, client certificates required
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerCredentialsConfig {
    pub ca_path: Option<PathBuf>,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
}

impl ServerCredentialsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// CA used to verify client certificates. Setting it turns on mutual TLS.
    pub fn with_ca(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_path = Some(path.into());
        self
    }

    pub fn with_identity(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.cert_path = Some(cert.into());
        self.key_path = Some(key.into());
        self
    }
}

impl FromEnv for ServerCredentialsConfig {
    /// Reads `GRPC_SERVER_CA_PATH`, `GRPC_SERVER_CERT_PATH` and `GRPC_SERVER_KEY_PATH`.
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            ca_path: env_optional("GRPC_SERVER_CA_PATH").map(PathBuf::from),
            cert_path: env_optional("GRPC_SERVER_CERT_PATH").map(PathBuf::from),
            key_path: env_optional("GRPC_SERVER_KEY_PATH").map(PathBuf::from),
        })
    }
}

/// Resolved server transport security.
#[derive(Clone)]
pub enum ServerSecurity {
    Insecure,
    Tls {
        config: Arc<rustls::ServerConfig>,
        client_auth: bool,
    },
}

impl ServerSecurity {
    pub fn mode(&self) -> TlsMode {
        match self {
            ServerSecurity::Insecure => TlsMode::Insecure,
            ServerSecurity::Tls {
                client_auth: true, ..
            } => TlsMode::MutualTls,
            ServerSecurity::Tls { .. } => TlsMode::ServerTls,
        }
    }

    /// rustls configuration for the acceptor; `None` when serving plaintext.
    pub fn tls_config(&self) -> Option<Arc<rustls::ServerConfig>> {
        match self {
            ServerSecurity::Insecure => None,
            ServerSecurity::Tls { config, .. } => Some(config.clone()),
        }
    }
}

impl fmt::Debug for ServerSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSecurity")
            .field("mode", &self.mode())
            .finish()
    }
}

fn missing_half(side: &str) -> CredentialError {
    CredentialError::key_pair(format!("server {side} is required when TLS material is configured"))
}

/// Turn server credential configuration into a ready rustls configuration.
///
/// The CA bundle is loaded before the key pair, so an unreadable CA is reported
/// even when the identity is also incomplete.
pub fn resolve_server(config: &ServerCredentialsConfig) -> Result<ServerSecurity, CredentialError> {
    let ca = present(&config.ca_path);
    let cert = present(&config.cert_path);
    let key = present(&config.key_path);

    if ca.is_none() && cert.is_none() && key.is_none() {
        return Ok(ServerSecurity::Insecure);
    }

    let provider = Arc::new(ring::default_provider());
    let client_roots = ca.map(load_ca).transpose()?;

    let cert = cert.ok_or_else(|| missing_half("certificate"))?;
    let key = key.ok_or_else(|| missing_half("private key"))?;
    let pair = load_key_pair(cert, key)?;

    let builder = rustls::ServerConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| CredentialError::key_pair(format!("unsupported TLS provider: {e}")))?;

    let client_auth = client_roots.is_some();
    let builder = match (client_roots, ca) {
        (Some(bundle), Some(ca_path)) => {
            let verifier = client_verifier(bundle.roots, provider, ca_path)?;
            builder.with_client_cert_verifier(verifier)
        }
        _ => builder.with_no_client_auth(),
    };

    let mut server_config = builder
        .with_single_cert(pair.chain, pair.key)
        .map_err(|e| {
            CredentialError::key_pair(format!(
                "certificate {} rejected with key {}: {e}",
                cert.display(),
                key.display()
            ))
        })?;
    server_config.alpn_protocols = vec![b"h2".to_vec()];

    Ok(ServerSecurity::Tls {
        config: Arc::new(server_config),
        client_auth,
    })
}

/// Verifier that requires every client to present a certificate chained to `roots`.
fn client_verifier(
    roots: rustls::RootCertStore,
    provider: Arc<CryptoProvider>,
    ca_path: &Path,
) -> Result<Arc<dyn rustls::server::danger::ClientCertVerifier>, CredentialError> {
    WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
        .build()
        .map_err(|e| {
            tracing::debug!(target: "grpc_bootstrap", error = %e, "client verifier rejected CA bundle");
            CredentialError::CaInvalid {
                path: ca_path.to_path_buf(),
            }
        })
}

use super::TlsMode;
use super::pem::{load_ca, load_key_pair, present};
use crate::error::CredentialError;
use core_config::{ConfigError, FromEnv, env_flag, env_optional};
use std::path::PathBuf;
use tonic::transport::{Certificate, ClientTlsConfig, Identity};

/// Client-side credential configuration.
///
/// Empty paths count as absent. When `insecure` is set nothing else is consulted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientCredentialsConfig {
    pub ca_path: Option<PathBuf>,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    /// Name checked against the server certificate instead of the dialed host
    pub server_name: Option<String>,
    pub insecure: bool,
}

impl ClientCredentialsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plaintext connection; TLS material is ignored.
    pub fn insecure() -> Self {
        Self {
            insecure: true,
            ..Self::default()
        }
    }

    pub fn with_ca(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_path = Some(path.into());
        self
    }

    /// Client certificate and key presented for mutual TLS.
    pub fn with_identity(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.cert_path = Some(cert.into());
        self.key_path = Some(key.into());
        self
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }
}

impl FromEnv for ClientCredentialsConfig {
    /// Reads `GRPC_CLIENT_CA_PATH`, `GRPC_CLIENT_CERT_PATH`, `GRPC_CLIENT_KEY_PATH`,
    /// `GRPC_CLIENT_SERVER_NAME` and `GRPC_CLIENT_INSECURE` (default: false).
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            ca_path: env_optional("GRPC_CLIENT_CA_PATH").map(PathBuf::from),
            cert_path: env_optional("GRPC_CLIENT_CERT_PATH").map(PathBuf::from),
            key_path: env_optional("GRPC_CLIENT_KEY_PATH").map(PathBuf::from),
            server_name: env_optional("GRPC_CLIENT_SERVER_NAME"),
            insecure: env_flag("GRPC_CLIENT_INSECURE", false)?,
        })
    }
}

/// Resolved client transport security.
#[derive(Debug, Clone)]
pub enum ClientSecurity {
    Insecure,
    Tls(ClientTls),
}

impl ClientSecurity {
    pub fn mode(&self) -> TlsMode {
        match self {
            ClientSecurity::Insecure => TlsMode::Insecure,
            ClientSecurity::Tls(tls) if tls.identity.is_some() => TlsMode::MutualTls,
            ClientSecurity::Tls(_) => TlsMode::ServerTls,
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, ClientSecurity::Tls(_))
    }
}

/// Validated client TLS material, ready to hand to the transport.
#[derive(Debug, Clone)]
pub struct ClientTls {
    ca_pem: Option<Vec<u8>>,
    identity: Option<(Vec<u8>, Vec<u8>)>,
    server_name: Option<String>,
}

impl ClientTls {
    /// `false` when the system trust store verifies the server.
    pub fn has_custom_ca(&self) -> bool {
        self.ca_pem.is_some()
    }

    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    pub fn to_tonic(&self) -> ClientTlsConfig {
        let mut config = ClientTlsConfig::new();
        config = match &self.ca_pem {
            Some(pem) => config.ca_certificate(Certificate::from_pem(pem)),
            None => config.with_native_roots(),
        };
        if let Some((cert, key)) = &self.identity {
            config = config.identity(Identity::from_pem(cert, key));
        }
        if let Some(name) = &self.server_name {
            config = config.domain_name(name.clone());
        }
        config
    }
}

/// Turn client credential configuration into transport security.
///
/// Reads files only when TLS is selected; every certificate and key is parsed
/// and checked here so that dialing cannot fail on bad material later.
pub fn resolve_client(config: &ClientCredentialsConfig) -> Result<ClientSecurity, CredentialError> {
    if config.insecure {
        return Ok(ClientSecurity::Insecure);
    }

    let ca = present(&config.ca_path);
    let cert = present(&config.cert_path);
    let key = present(&config.key_path);

    if ca.is_none() && cert.is_none() && key.is_none() {
        return Ok(ClientSecurity::Insecure);
    }

    let ca_pem = ca.map(load_ca).transpose()?.map(|bundle| bundle.pem);

    let identity = match (cert, key) {
        (Some(cert), Some(key)) => {
            let pair = load_key_pair(cert, key)?;
            Some((pair.cert_pem, pair.key_pem))
        }
        (None, None) => None,
        (Some(cert), None) => {
            return Err(CredentialError::key_pair(format!(
                "certificate {} given without a private key",
                cert.display()
            )));
        }
        (None, Some(key)) => {
            return Err(CredentialError::key_pair(format!(
                "private key {} given without a certificate",
                key.display()
            )));
        }
    };

    Ok(ClientSecurity::Tls(ClientTls {
        ca_pem,
        identity,
        server_name: config.server_name.clone().filter(|name| !name.is_empty()),
    }))
}

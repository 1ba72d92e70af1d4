use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by [`new_connection`](crate::new_connection) and
/// [`new_server`](crate::new_server).
///
/// Per-call failures are never reported here; they travel as `tonic::Status`.
#[derive(Error, Debug)]
pub enum Error {
    /// Client-side TLS material could not be resolved
    #[error("failed to resolve client credentials: {0}")]
    ClientCredentials(#[source] CredentialError),

    /// Server-side TLS material could not be resolved
    #[error("failed to resolve server credentials: {0}")]
    ServerCredentials(#[source] CredentialError),

    /// Invalid URI provided for connection
    #[error("Invalid URI: {0}")]
    InvalidUri(#[source] tonic::transport::Error),

    /// Failed to establish connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] tonic::transport::Error),

    /// Listener or connection I/O failure while serving
    #[error("server I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// The credential failure kind, when construction failed while resolving credentials.
    pub fn credential_kind(&self) -> Option<CredentialErrorKind> {
        match self {
            Error::ClientCredentials(err) | Error::ServerCredentials(err) => Some(err.kind()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialErrorKind {
    CaUnreadable,
    CaInvalid,
    KeyPairInvalid,
}

/// Failure to turn credential configuration into a transport-security context.
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("cannot read CA bundle {}: {source}", path.display())]
    CaUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CA bundle {} contains no usable PEM certificates", path.display())]
    CaInvalid { path: PathBuf },

    #[error("invalid certificate/key pair: {reason}")]
    KeyPairInvalid { reason: String },
}

impl CredentialError {
    pub fn kind(&self) -> CredentialErrorKind {
        match self {
            CredentialError::CaUnreadable { .. } => CredentialErrorKind::CaUnreadable,
            CredentialError::CaInvalid { .. } => CredentialErrorKind::CaInvalid,
            CredentialError::KeyPairInvalid { .. } => CredentialErrorKind::KeyPairInvalid,
        }
    }

    pub(crate) fn key_pair(reason: impl Into<String>) -> Self {
        CredentialError::KeyPairInvalid {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_kind_is_exposed_through_factory_error() {
        let err = Error::ServerCredentials(CredentialError::CaInvalid {
            path: PathBuf::from("/etc/tls/ca.pem"),
        });
        assert_eq!(err.credential_kind(), Some(CredentialErrorKind::CaInvalid));

        let io_err = Error::Io(io::Error::other("boom"));
        assert_eq!(io_err.credential_kind(), None);
    }

    #[test]
    fn test_error_messages_name_the_side_and_file() {
        let err = Error::ClientCredentials(CredentialError::CaUnreadable {
            path: PathBuf::from("/missing/ca.pem"),
            source: io::Error::from(io::ErrorKind::NotFound),
        });
        let message = err.to_string();
        assert!(message.contains("client credentials"));
        assert!(message.contains("/missing/ca.pem"));
    }
}

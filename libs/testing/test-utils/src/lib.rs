//! Shared test utilities for the gRPC bootstrap crates
//!
//! - [`TestPki`]: a throwaway certificate authority with server and client
//!   certificates written as PEM files into a temp directory.
//!
//! # Usage
//!
//! ```rust,no_run
//! use test_utils::TestPki;
//!
//! let pki = TestPki::generate();
//! let ca = pki.ca_cert();            // CA bundle both sides trust
//! let (cert, key) = pki.server_pair(); // server identity for "localhost"
//! let (cert, key) = pki.client_pair(); // client identity signed by the same CA
//! ```

use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// DNS name on the server certificate. Clients must verify against this name.
pub const SERVER_NAME: &str = "localhost";

/// Certificate authority, server identity and client identity on disk.
///
/// Files live as long as the `TestPki` value; dropping it removes the directory.
pub struct TestPki {
    dir: TempDir,
}

impl TestPki {
    /// Generate a fresh CA plus a server and a client certificate signed by it.
    pub fn generate() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir for test PKI");

        let ca_key = KeyPair::generate().expect("Failed to generate CA key");
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).expect("CA params");
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "grpc-bootstrap test CA");
        let ca_cert = ca_params.self_signed(&ca_key).expect("Failed to self-sign CA");

        let server_key = KeyPair::generate().expect("Failed to generate server key");
        let mut server_params =
            CertificateParams::new(vec![SERVER_NAME.to_string()]).expect("server params");
        server_params
            .distinguished_name
            .push(DnType::CommonName, SERVER_NAME);
        server_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        let server_cert = server_params
            .signed_by(&server_key, &ca_cert, &ca_key)
            .expect("Failed to sign server certificate");

        let client_key = KeyPair::generate().expect("Failed to generate client key");
        let mut client_params =
            CertificateParams::new(vec!["client.test".to_string()]).expect("client params");
        client_params
            .distinguished_name
            .push(DnType::CommonName, "grpc-bootstrap test client");
        client_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        let client_cert = client_params
            .signed_by(&client_key, &ca_cert, &ca_key)
            .expect("Failed to sign client certificate");

        let pki = Self { dir };
        pki.write("ca.pem", ca_cert.pem());
        pki.write("server.pem", server_cert.pem());
        pki.write("server.key", server_key.serialize_pem());
        pki.write("client.pem", client_cert.pem());
        pki.write("client.key", client_key.serialize_pem());
        pki
    }

    /// Directory holding every generated file.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn ca_cert(&self) -> PathBuf {
        self.path("ca.pem")
    }

    /// `(certificate, private key)` for the server, valid for [`SERVER_NAME`].
    pub fn server_pair(&self) -> (PathBuf, PathBuf) {
        (self.path("server.pem"), self.path("server.key"))
    }

    /// `(certificate, private key)` for a client signed by the same CA.
    pub fn client_pair(&self) -> (PathBuf, PathBuf) {
        (self.path("client.pem"), self.path("client.key"))
    }

    /// A valid private key that matches none of the generated certificates.
    pub fn unrelated_key(&self) -> PathBuf {
        let key = KeyPair::generate().expect("Failed to generate unrelated key");
        self.write("unrelated.key", key.serialize_pem())
    }

    /// Write arbitrary contents (e.g. a corrupt PEM) and return the path.
    pub fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, contents).expect("Failed to write test PKI file");
        path
    }

    /// Path inside the PKI directory, whether or not the file exists.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_writes_all_files() {
        let pki = TestPki::generate();
        let (server_cert, server_key) = pki.server_pair();
        let (client_cert, client_key) = pki.client_pair();

        for path in [pki.ca_cert(), server_cert, server_key, client_cert, client_key] {
            let contents = fs::read_to_string(&path).unwrap();
            assert!(contents.contains("-----BEGIN"), "{} is not PEM", path.display());
        }
    }

    #[test]
    fn test_path_does_not_create_file() {
        let pki = TestPki::generate();
        assert!(!pki.path("missing.pem").exists());
    }

    #[test]
    fn test_directory_removed_on_drop() {
        let pki = TestPki::generate();
        let dir = pki.dir().to_path_buf();
        drop(pki);
        assert!(!dir.exists());
    }
}

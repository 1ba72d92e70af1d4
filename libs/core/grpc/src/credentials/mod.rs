//! Credential resolution: configuration in, transport security out.
//!
//! Resolution reads PEM files from disk and nothing else. Every certificate and
//! key is parsed and cross-checked up front so a bad deployment fails at
//! startup rather than on the first handshake.

mod client;
mod pem;
mod server;

pub use client::{ClientCredentialsConfig, ClientSecurity, ClientTls, resolve_client};
pub use server::{ServerCredentialsConfig, ServerSecurity, resolve_server};

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TlsMode {
    /// No transport security
    Insecure,
    /// Only the server is authenticated
    ServerTls,
    /// Both sides present certificates
    MutualTls,
}

impl fmt::Display for TlsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TlsMode::Insecure => "insecure",
            TlsMode::ServerTls => "tls",
            TlsMode::MutualTls => "mutual-tls",
        })
    }
}

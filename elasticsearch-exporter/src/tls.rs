//! Transport security for the upstream connection.
//!
//! All TLS material is loaded and parsed at startup. A bad file is a fatal
//! error, never a per-request failure.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use reqwest::{Certificate, Identity};
use thiserror::Error;
use tracing::warn;

use crate::config::TlsConfig;

/// TLS construction errors.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("Failed to read {kind} file '{}': {source}", .path.display())]
    Read {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse {kind} file '{}': {source}", .path.display())]
    Parse {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No certificates found in {kind} file '{}'", .path.display())]
    NoCertificates { kind: &'static str, path: PathBuf },

    #[error("No private key found in '{}'", .path.display())]
    NoPrivateKey { path: PathBuf },

    #[error("Invalid {kind} material in '{}': {source}", .path.display())]
    Invalid {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: reqwest::Error,
    },

    #[error("Client certificate and private key must be given together (missing {missing})")]
    IncompleteClientIdentity { missing: &'static str },
}

/// Trust and identity material for a TLS connection.
pub struct TlsContext {
    /// Trusted roots. When set, they replace the built-in roots.
    pub ca_certificates: Option<Vec<Certificate>>,
    /// Client certificate and key.
    pub identity: Option<Identity>,
    /// Skip upstream certificate validation.
    pub insecure_skip_verify: bool,
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("TlsContext")
            .field(
                "ca_certificates",
                &self.ca_certificates.as_ref().map(Vec::len),
            )
            .field("identity", &self.identity.is_some())
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .finish()
    }
}

/// Upstream transport: plain (default client behavior) or explicit TLS.
#[derive(Debug)]
pub enum TransportContext {
    Plain,
    Tls(TlsContext),
}

impl TransportContext {
    /// Load and validate TLS material. Performs file reads only.
    pub fn build(config: &TlsConfig) -> Result<Self, TlsError> {
        if config.is_empty() {
            return Ok(TransportContext::Plain);
        }

        let ca_certificates = config
            .ca
            .as_deref()
            .map(load_ca_certificates)
            .transpose()?;

        let identity = match (&config.client_cert, &config.client_key) {
            (Some(cert), Some(key)) => Some(load_identity(cert, key)?),
            (None, None) => None,
            (Some(_), None) => {
                return Err(TlsError::IncompleteClientIdentity {
                    missing: "es.client-private-key",
                });
            }
            (None, Some(_)) => {
                return Err(TlsError::IncompleteClientIdentity {
                    missing: "es.client-cert",
                });
            }
        };

        if config.insecure_skip_verify {
            warn!(
                insecure = true,
                "Upstream certificate verification is disabled (es.ssl-skip-verify)"
            );
        }

        Ok(TransportContext::Tls(TlsContext {
            ca_certificates,
            identity,
            insecure_skip_verify: config.insecure_skip_verify,
        }))
    }

    /// Short name of the transport mode for logs: `plain`, `tls` or `insecure`.
    pub fn mode(&self) -> &'static str {
        match self {
            TransportContext::Plain => "plain",
            TransportContext::Tls(ctx) if ctx.insecure_skip_verify => "insecure",
            TransportContext::Tls(_) => "tls",
        }
    }

    pub fn is_plain(&self) -> bool {
        matches!(self, TransportContext::Plain)
    }
}

fn read_pem(kind: &'static str, path: &Path) -> Result<Vec<u8>, TlsError> {
    std::fs::read(path).map_err(|source| TlsError::Read {
        kind,
        path: path.to_path_buf(),
        source,
    })
}

fn parse_certificates(kind: &'static str, path: &Path, pem: &[u8]) -> Result<usize, TlsError> {
    let mut reader = pem;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Parse {
            kind,
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates {
            kind,
            path: path.to_path_buf(),
        });
    }
    Ok(certs.len())
}

fn load_ca_certificates(path: &Path) -> Result<Vec<Certificate>, TlsError> {
    const KIND: &str = "CA";

    let pem = read_pem(KIND, path)?;
    parse_certificates(KIND, path, &pem)?;

    Certificate::from_pem_bundle(&pem).map_err(|source| TlsError::Invalid {
        kind: KIND,
        path: path.to_path_buf(),
        source,
    })
}

fn load_identity(cert_path: &Path, key_path: &Path) -> Result<Identity, TlsError> {
    const CERT_KIND: &str = "client certificate";
    const KEY_KIND: &str = "client private key";

    let cert_pem = read_pem(CERT_KIND, cert_path)?;
    parse_certificates(CERT_KIND, cert_path, &cert_pem)?;

    let key_pem = read_pem(KEY_KIND, key_path)?;
    let mut reader = key_pem.as_slice();
    let key = rustls_pemfile::private_key(&mut reader).map_err(|source| TlsError::Parse {
        kind: KEY_KIND,
        path: key_path.to_path_buf(),
        source,
    })?;
    if key.is_none() {
        return Err(TlsError::NoPrivateKey {
            path: key_path.to_path_buf(),
        });
    }

    let mut bundle = cert_pem;
    bundle.push(b'\n');
    bundle.extend_from_slice(&key_pem);
    Identity::from_pem(&bundle).map_err(|source| TlsError::Invalid {
        kind: KEY_KIND,
        path: key_path.to_path_buf(),
        source,
    })
}

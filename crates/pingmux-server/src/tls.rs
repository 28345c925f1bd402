//! Mutual-TLS listener configuration.
//!
//! When TLS is enabled the server presents its own certificate and requires
//! every client to present one verifiable against the configured CA.

use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use thiserror::Error;
use tokio::fs;

use pingmux_settings::TlsSettings;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("certificate file not found: {0}")]
    CertificateNotFound(PathBuf),

    #[error("private key file not found: {0}")]
    PrivateKeyNotFound(PathBuf),

    #[error("failed to parse certificate {path}: {message}")]
    CertificateParseFailed { path: PathBuf, message: String },

    #[error("failed to parse private key {path}: {message}")]
    PrivateKeyParseFailed { path: PathBuf, message: String },

    #[error("no private key found in {0}")]
    NoPrivateKeyFound(PathBuf),

    #[error("TLS configuration error: {0}")]
    Configuration(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the listener TLS configuration with mandatory client verification.
pub async fn build_rustls_config(settings: &TlsSettings) -> Result<RustlsConfig, TlsError> {
    let ca_certs = load_certificates(Path::new(&settings.ca_certificate)).await?;
    let mut roots = RootCertStore::empty();
    for cert in ca_certs {
        roots
            .add(cert)
            .map_err(|e| TlsError::Configuration(e.to_string()))?;
    }

    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| TlsError::Configuration(e.to_string()))?;

    let cert_chain = load_certificates(Path::new(&settings.server_certificate)).await?;
    let private_key = load_private_key(Path::new(&settings.server_private_key)).await?;

    let config = rustls::ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(cert_chain, private_key)
        .map_err(|e| TlsError::Configuration(e.to_string()))?;

    Ok(RustlsConfig::from_config(Arc::new(config)))
}

async fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    if !path.exists() {
        return Err(TlsError::CertificateNotFound(path.to_path_buf()));
    }
    let pem = fs::read(path).await?;
    let mut reader = BufReader::new(&pem[..]);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::CertificateParseFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    if certs.is_empty() {
        return Err(TlsError::CertificateParseFailed {
            path: path.to_path_buf(),
            message: "no certificates in file".to_string(),
        });
    }
    Ok(certs)
}

async fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    if !path.exists() {
        return Err(TlsError::PrivateKeyNotFound(path.to_path_buf()));
    }
    let pem = fs::read(path).await?;

    let mut reader = BufReader::new(&pem[..]);
    let mut keys = rustls_pemfile::pkcs8_private_keys(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::PrivateKeyParseFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    if let Some(key) = keys.pop() {
        return Ok(PrivateKeyDer::from(key));
    }

    // Fall back to the legacy RSA format.
    let mut reader = BufReader::new(&pem[..]);
    let mut keys = rustls_pemfile::rsa_private_keys(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::PrivateKeyParseFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    match keys.pop() {
        Some(key) => Ok(PrivateKeyDer::from(key)),
        None => Err(TlsError::NoPrivateKeyFound(path.to_path_buf())),
    }
}

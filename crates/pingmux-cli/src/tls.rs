//! Client-side mutual-TLS configuration.

use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rustls::RootCertStore;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

/// Build a rustls client configuration that trusts the given CA and
/// authenticates with the given certificate and key.
pub fn build_client_config(
    ca_path: &Path,
    cert_path: &Path,
    key_path: &Path,
) -> Result<Arc<rustls::ClientConfig>> {
    let mut roots = RootCertStore::empty();
    for cert in load_certificates(ca_path)? {
        roots
            .add(cert)
            .with_context(|| format!("bad CA certificate in {}", ca_path.display()))?;
    }

    let cert_chain = load_certificates(cert_path)?;
    let private_key = load_private_key(key_path)?;

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(cert_chain, private_key)
        .context("building TLS client configuration")?;
    Ok(Arc::new(config))
}

fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let pem = std::fs::read(path)
        .with_context(|| format!("cannot read certificate file {}", path.display()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(&pem[..]))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("cannot parse {}", path.display()))?;
    if certs.is_empty() {
        bail!("no certificates found in {}", path.display());
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let pem = std::fs::read(path)
        .with_context(|| format!("cannot read key file {}", path.display()))?;

    let mut keys = rustls_pemfile::pkcs8_private_keys(&mut BufReader::new(&pem[..]))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("cannot parse {}", path.display()))?;
    if let Some(key) = keys.pop() {
        return Ok(PrivateKeyDer::from(key));
    }

    let mut keys = rustls_pemfile::rsa_private_keys(&mut BufReader::new(&pem[..]))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("cannot parse {}", path.display()))?;
    match keys.pop() {
        Some(key) => Ok(PrivateKeyDer::from(key)),
        None => bail!("no private key found in {}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_are_reported_with_the_path() {
        let err = load_certificates(Path::new("/nonexistent/ca.crt")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/ca.crt"));

        let err = load_private_key(Path::new("/nonexistent/client.pem")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/client.pem"));
    }

    #[test]
    fn empty_pem_is_rejected() {
        let dir = std::env::temp_dir().join(format!("pingmux-cli-tls-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("empty.crt");
        std::fs::write(&path, "").unwrap();

        let err = load_certificates(&path).unwrap_err();
        assert!(err.to_string().contains("no certificates"));
        std::fs::remove_dir_all(&dir).ok();
    }
}

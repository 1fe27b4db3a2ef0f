//! TLS acceptor for LDAPS and StartTLS.

use crate::config::TlsConfig;
use crate::error::ServerError;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

/// Loads TLS certificates and creates a TLS acceptor.
pub fn create_tls_acceptor(config: &TlsConfig) -> Result<TlsAcceptor, ServerError> {
    // Validate configuration before loading files
    let cert_path = config
        .cert_path
        .as_ref()
        .ok_or_else(|| ServerError::TlsConfig("cert_path not set".into()))?;
    let key_path = config
        .key_path
        .as_ref()
        .ok_or_else(|| ServerError::TlsConfig("key_path not set".into()))?;

    // Client certificates back SASL EXTERNAL; check the CA early
    let client_ca_path = match (&config.client_ca_path, config.require_client_cert) {
        (None, true) => {
            return Err(ServerError::TlsConfig(
                "client_ca_path not set for client certificate authentication".into(),
            ))
        }
        (path, _) => path.as_deref(),
    };

    // Load server certificate chain
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let builder = rustls::ServerConfig::builder();
    let server_config = match client_ca_path {
        Some(client_ca_path) => {
            let client_verifier = client_verifier(client_ca_path, config.require_client_cert)?;
            builder
                .with_client_cert_verifier(client_verifier)
                .with_single_cert(certs, key)
        }
        None => builder.with_no_client_auth().with_single_cert(certs, key),
    }
    .map_err(|e| ServerError::TlsConfig(format!("invalid server cert/key: {}", e)))?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

/// Verifier for client certificates issued by the CAs in `path`. Clients
/// without a certificate are still accepted unless `required`.
fn client_verifier(
    path: &Path,
    required: bool,
) -> Result<Arc<dyn rustls::server::danger::ClientCertVerifier>, ServerError> {
    let mut root_store = RootCertStore::empty();
    for cert in load_certs(path)? {
        root_store
            .add(cert)
            .map_err(|e| ServerError::TlsConfig(format!("invalid client CA cert: {}", e)))?;
    }

    let builder = WebPkiClientVerifier::builder(Arc::new(root_store));
    let builder = if required {
        builder
    } else {
        builder.allow_unauthenticated()
    };
    builder
        .build()
        .map_err(|e| ServerError::TlsConfig(format!("failed to build client verifier: {}", e)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    let file = File::open(path)
        .map_err(|e| ServerError::TlsConfig(format!("cannot open cert file {:?}: {}", path, e)))?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::TlsConfig(format!("invalid cert file {:?}: {}", path, e)))
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ServerError> {
    let file = File::open(path)
        .map_err(|e| ServerError::TlsConfig(format!("cannot open key file {:?}: {}", path, e)))?;
    let mut reader = BufReader::new(file);

    loop {
        match rustls_pemfile::read_one(&mut reader)
            .map_err(|e| ServerError::TlsConfig(format!("invalid key file {:?}: {}", path, e)))?
        {
            Some(rustls_pemfile::Item::Pkcs1Key(key)) => return Ok(key.into()),
            Some(rustls_pemfile::Item::Pkcs8Key(key)) => return Ok(key.into()),
            Some(rustls_pemfile::Item::Sec1Key(key)) => return Ok(key.into()),
            None => {
                return Err(ServerError::TlsConfig(format!(
                    "no private key found in {:?}",
                    path
                )))
            }
            _ => continue, // Skip other PEM items (certs, etc.)
        }
    }
}

//! Client TLS configuration.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::CertificateDer;
use rustls_pki_types::pem::PemObject;

use crate::error::Error;

/// Parameters for the TLS leg of [`open`](crate::open).
///
/// The server name defaults to the host the connection is opened against;
/// ALPN offers are sent in the given order (most preferred first).
#[derive(Debug, Clone, Default)]
pub struct TlsParams {
    sni: Option<String>,
    alpn: Vec<Vec<u8>>,
    ca_bundle: Option<PathBuf>,
}

impl TlsParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the SNI / verification name (defaults to the target host).
    #[must_use]
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.sni = Some(name.into());
        self
    }

    /// Sets the ALPN protocols to offer, most preferred first.
    #[must_use]
    pub fn with_alpn<I, P>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        self.alpn = protocols
            .into_iter()
            .map(|p| p.as_ref().to_vec())
            .collect();
        self
    }

    /// Verifies the peer against the PEM bundle at `path` instead of the
    /// built-in webpki roots.
    #[must_use]
    pub fn with_ca_bundle(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_bundle = Some(path.into());
        self
    }

    pub(crate) fn server_name<'a>(&'a self, host: &'a str) -> &'a str {
        self.sni.as_deref().unwrap_or(host)
    }

    pub(crate) fn client_config(&self) -> Result<Arc<ClientConfig>, Error> {
        let mut roots = RootCertStore::empty();
        match &self.ca_bundle {
            Some(path) => {
                let certs = CertificateDer::pem_file_iter(path)
                    .map_err(|e| Error::Tls(io::Error::new(io::ErrorKind::InvalidData, e)))?;
                for cert in certs {
                    let cert = cert
                        .map_err(|e| Error::Tls(io::Error::new(io::ErrorKind::InvalidData, e)))?;
                    roots
                        .add(cert)
                        .map_err(|e| Error::Tls(io::Error::other(e)))?;
                }
            }
            None => {
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            }
        }

        let mut config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        config.alpn_protocols = self.alpn.clone();
        Ok(Arc::new(config))
    }
}

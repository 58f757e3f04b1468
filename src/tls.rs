//! Certificate loading for mutual TLS between coordinator and workers.

use std::path::{Path, PathBuf};

use tokio::fs;
use tonic::transport::{Certificate, ClientTlsConfig, Identity, ServerTlsConfig};

use crate::config::TlsConfig;

/// Server name workers expect in the coordinator's certificate. Workers dial
/// by IP, so trust rests on the CA rather than the host name.
pub const TLS_DOMAIN: &str = "token-lease";

/// Error type for TLS configuration issues.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("CA certificate path not configured")]
    MissingCaCert,

    #[error("Certificate path not configured")]
    MissingCert,

    #[error("Private key path not configured")]
    MissingKey,

    #[error("{kind} not found: {path}")]
    NotFound { kind: &'static str, path: PathBuf },

    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),
}

/// CA plus this process's certificate and key, ready for tonic.
#[derive(Clone)]
pub struct TlsIdentity {
    identity: Identity,
    ca_cert: Certificate,
}

async fn read_pem(path: &Path, kind: &'static str) -> Result<Vec<u8>, TlsError> {
    if !path.exists() {
        return Err(TlsError::NotFound {
            kind,
            path: path.to_path_buf(),
        });
    }
    Ok(fs::read(path).await?)
}

impl TlsIdentity {
    /// Load TLS materials from the paths in `config`.
    ///
    /// # Errors
    ///
    /// Fails if a path is not configured or a file cannot be read.
    pub async fn load(config: &TlsConfig) -> Result<Self, TlsError> {
        let ca_cert_path = config
            .ca_cert_path
            .as_ref()
            .ok_or(TlsError::MissingCaCert)?;
        let cert_path = config.cert_path.as_ref().ok_or(TlsError::MissingCert)?;
        let key_path = config.key_path.as_ref().ok_or(TlsError::MissingKey)?;

        let ca_pem = read_pem(ca_cert_path, "CA certificate").await?;
        let cert_pem = read_pem(cert_path, "Certificate").await?;
        let key_pem = read_pem(key_path, "Private key").await?;

        Ok(Self {
            identity: Identity::from_pem(cert_pem, key_pem),
            ca_cert: Certificate::from_pem(ca_pem),
        })
    }

    /// Resolve the coordinator's TLS setup from `config`.
    ///
    /// Returns `Ok(None)` for plaintext: either TLS is off, or it is on but
    /// broken and `allow_insecure` is set.
    pub async fn resolve(config: &TlsConfig) -> Result<Option<Self>, TlsError> {
        if !config.enabled {
            return Ok(None);
        }

        match Self::load(config).await {
            Ok(identity) => {
                tracing::info!("TLS enabled with mTLS authentication");
                Ok(Some(identity))
            }
            Err(e) if config.allow_insecure => {
                tracing::warn!(error = %e, "TLS setup failed, running in insecure mode");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Server side: present our certificate and require a CA-signed client.
    pub fn server_tls_config(&self) -> ServerTlsConfig {
        ServerTlsConfig::new()
            .identity(self.identity.clone())
            .client_ca_root(self.ca_cert.clone())
    }

    /// Client side: present our certificate and verify the coordinator.
    pub fn client_tls_config(&self) -> ClientTlsConfig {
        ClientTlsConfig::new()
            .domain_name(TLS_DOMAIN)
            .ca_certificate(self.ca_cert.clone())
            .identity(self.identity.clone())
    }
}

//! Certificate trust relaxations needed by the mirror.
//!
//! The mirror impersonates the remote origin with a self-signed certificate,
//! and fetches from the real origin without checking its certificate chain.
//! Two relaxations make that work:
//!
//! - **Outbound**: [`relaxed_client`] builds an HTTP client that accepts any
//!   server certificate. Only the upstream processor uses it; every other
//!   client in the process keeps full validation.
//! - **Inbound**: surfaces loading the mirror raise certificate errors for
//!   the self-signed certificate. [`CertificatePolicy`] decides which of
//!   those the orchestrator accepts.
//!
//! Both weaken TLS guarantees. A launcher running with these relaxations
//! trusts any server that answers on the upstream path, and its surfaces
//! trust whatever certificate the policy lets through.

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::mirror::MirrorError;
use crate::surface::HostFlags;

/// Which surface certificate errors the orchestrator accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CertificatePolicy {
    /// Accept every certificate error.
    #[default]
    AcceptAll,
    /// Accept only errors raised for URLs on the mirror origin.
    MirrorOnly,
}

impl CertificatePolicy {
    /// Decides whether a certificate error raised while loading `url` is accepted.
    ///
    /// `mirror_origin` is `None` while the mirror is not listening.
    pub fn accepts(&self, url: &str, mirror_origin: Option<&str>) -> bool {
        match self {
            CertificatePolicy::AcceptAll => true,
            CertificatePolicy::MirrorOnly => mirror_origin.is_some_and(|origin| {
                url.strip_prefix(origin)
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            }),
        }
    }
}

impl std::fmt::Display for CertificatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CertificatePolicy::AcceptAll => write!(f, "accept-all"),
            CertificatePolicy::MirrorOnly => write!(f, "mirror-only"),
        }
    }
}

/// Host flags for a mirror session.
pub fn host_flags(disable_hardware_acceleration: bool) -> HostFlags {
    HostFlags {
        disable_hardware_acceleration,
        ignore_certificate_errors: true,
    }
}

/// Builds the HTTP client used for upstream fetches. It accepts invalid
/// server certificates.
pub fn relaxed_client(timeout: Duration) -> Result<reqwest::Client, MirrorError> {
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Loads the mirror's certificate chain and private key from PEM files.
pub fn load_server_config(
    cert_path: &Path,
    key_path: &Path,
) -> Result<Arc<rustls::ServerConfig>, MirrorError> {
    let cert_error = |message: String| MirrorError::Certificate {
        path: cert_path.to_path_buf(),
        message,
    };

    let certs = CertificateDer::pem_file_iter(cert_path)
        .map_err(|e| cert_error(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| cert_error(e.to_string()))?;
    if certs.is_empty() {
        return Err(cert_error("no certificates found".to_string()));
    }

    let key = PrivateKeyDer::from_pem_file(key_path).map_err(|e| MirrorError::Certificate {
        path: key_path.to_path_buf(),
        message: e.to_string(),
    })?;

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

//! Errors raised by the mirror server.

use std::path::PathBuf;

/// Errors that can occur while starting or running the mirror server.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// Binding the listener failed for a reason other than the port being in use.
    #[error("Failed to bind mirror listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The port stayed in use for more rebind attempts than allowed.
    #[error("Port still in use after {attempts} rebind attempts")]
    RebindExhausted { attempts: u32 },

    /// A certificate or key file could not be loaded.
    #[error("Failed to load {}: {message}", path.display())]
    Certificate { path: PathBuf, message: String },

    /// rustls rejected the server configuration.
    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),

    /// The upstream HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

//! Local HTTPS mirror of the remote game origin.
//!
//! - [`server`]: listener lifecycle and wildcard routing
//! - [`listener`]: configured port with ephemeral fallback
//! - [`processor`]: the pluggable request handler
//! - [`trust`]: certificate loading and trust relaxations

pub mod error;
pub mod listener;
pub mod processor;
pub mod server;
pub mod trust;

pub use error::MirrorError;
pub use listener::acquire_listener;
pub use processor::{MirrorRequest, MirrorResponse, RequestProcessor, UpstreamProcessor};
pub use server::{
    create_router, mirror_origin, wait_listening, MirrorServer, MirrorServerState, MIRROR_HOST,
    MIRROR_ROOT_PATH,
};
pub use trust::{host_flags, load_server_config, relaxed_client, CertificatePolicy};

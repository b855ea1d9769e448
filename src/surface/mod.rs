//! Display surfaces: the window host seam, window configuration, and the
//! role registry the orchestrator keeps.
//!
//! # Submodules
//!
//! - [`host`] - `SurfaceHost` trait, surface events, and the mock host
//! - [`config`] - Full and partial window configuration
//! - [`registry`] - Role to surface mapping

pub mod config;
pub mod host;
pub mod registry;

pub use config::{SurfaceConfig, WindowOptions};
pub use host::{
    ConsoleLevel, EventOutcome, HostFlags, MockSurface, MockSurfaceHost, SurfaceEvent,
    SurfaceHost, SurfaceId,
};
pub use registry::{SurfaceRecord, SurfaceRegistry, SurfaceRole};

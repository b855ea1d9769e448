//! # Mirror Launcher
//!
//! A desktop launcher that puts a local HTTPS mirror between a remote web
//! game and the window that shows it, so third-party scripts can be injected
//! into the live page.
//!
//! ## Features
//!
//! - **Local Mirror**: TLS-terminating server that hands every request to a
//!   pluggable [`mirror::RequestProcessor`], falling back to an ephemeral
//!   port when the configured one is taken
//! - **Navigation Pinning**: navigations back to the remote origin are
//!   redirected through the mirror
//! - **Script Injection**: scripts listed in `active.json` run on every page
//!   load, either immediately or once the page's readiness global appears
//! - **Surface Orchestration**: manager, game and tool windows driven by
//!   control messages through a [`surface::SurfaceHost`]
//! - **Flexible Configuration**: TOML/JSON files, environment variables, CLI arguments
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mirror_launcher::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = LauncherSettings::default();
//!     let host = Arc::new(MockSurfaceHost::new());
//!
//!     let mut orchestrator = Orchestrator::from_settings(host, settings)?;
//!     orchestrator.start().await?;
//!
//!     let (game, port) = orchestrator.start_game().await?;
//!     println!("game surface {} on port {}", game, port);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`mirror`]: HTTPS mirror server, port acquisition, trust relaxations
//! - [`injection`]: Script manifest, gated execution, per-load scheduling
//! - [`orchestrator`]: Surface lifecycle, control messages, navigation
//! - [`surface`]: Window host seam, window configuration, role registry
//! - [`config`]: Configuration loading and management
//!
//! ## Configuration
//!
//! Configuration follows a precedence chain:
//! 1. Default values
//! 2. Configuration file (TOML/JSON)
//! 3. Environment variables (`MIRROR_LAUNCHER_*`)
//! 4. CLI arguments
//!
//! See [`config::LauncherSettings`] for all available options.

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Full version string with name
pub const FULL_VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Module Exports
// ============================================================================

/// Local HTTPS mirror of the remote game origin.
pub mod mirror;

/// Third-party script manifest, preparation and scheduling.
pub mod injection;

/// Surface lifecycle, control messages, navigation interception.
pub mod orchestrator;

/// Window host abstraction and surface bookkeeping.
pub mod surface;

/// Configuration management for loading settings from files, env, and CLI.
pub mod config;

// ============================================================================
// Re-exports for Convenience
// ============================================================================

// Mirror types
pub use mirror::{
    CertificatePolicy, MirrorError, MirrorRequest, MirrorResponse, MirrorServer,
    MirrorServerState, RequestProcessor, UpstreamProcessor,
};

// Injection types
pub use injection::{
    ExecutionMode, GateConfig, InjectionReport, InjectionScheduler, PreparedScript,
    ScriptDescriptor, ScriptRegistry,
};

// Orchestrator types
pub use orchestrator::{
    ControlChannel, ControlMessage, ControlProcessor, ControlResponse, NavigationDecision,
    NavigationGuard, Orchestrator, TitlePicker, ToolDescriptor,
};

// Surface types
pub use surface::{
    EventOutcome, MockSurfaceHost, SurfaceConfig, SurfaceEvent, SurfaceHost, SurfaceId,
    SurfaceRegistry, SurfaceRole, WindowOptions,
};

// Config types
pub use config::{CliArgs, ConfigError, LauncherSettings, UserConfig};

// ============================================================================
// Prelude Module
// ============================================================================

/// Prelude module for convenient imports.
///
/// ```rust
/// use mirror_launcher::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{CliArgs, LauncherSettings};
    pub use crate::mirror::{MirrorServer, RequestProcessor};
    pub use crate::orchestrator::{ControlChannel, ControlMessage, Orchestrator};
    pub use crate::surface::{MockSurfaceHost, SurfaceEvent, SurfaceHost};
    pub use crate::{FULL_VERSION, NAME, VERSION};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constants() {
        assert!(!VERSION.is_empty());
        assert!(!NAME.is_empty());
        assert!(FULL_VERSION.contains(VERSION));
        assert!(FULL_VERSION.contains(NAME));
    }

    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;
        let _ = VERSION;
        let _ = NAME;
    }
}

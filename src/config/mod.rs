//! Configuration module for mirror-launcher.
//!
//! - Launcher settings from files (TOML/JSON), environment and CLI
//! - User preferences written by the management UI
//!
//! # Example
//!
//! ```rust,no_run
//! use mirror_launcher::config::LauncherSettings;
//!
//! let settings = LauncherSettings::from_file("launcher.toml").unwrap();
//! let settings = settings.merge_with_env();
//! ```

mod settings;
mod user;

pub use settings::{CliArgs, ConfigError, LauncherSettings};
pub use user::UserConfig;

//! Launcher settings and configuration management.
//!
//! Settings come from several sources with the usual precedence: defaults,
//! then a configuration file, then environment variables, then CLI arguments.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::mirror::CertificatePolicy;
use crate::orchestrator::title::{default_titles, WeightedTitle};
use crate::surface::SurfaceConfig;

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML configuration.
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),

    /// Failed to serialize TOML configuration.
    #[error("Failed to serialize TOML configuration: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    /// Failed to parse JSON configuration.
    #[error("Failed to parse JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// Unsupported file format.
    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

/// Main launcher settings.
///
/// # Configuration Precedence
///
/// Settings are applied in the following order (later sources override earlier):
/// 1. Default values
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables (`MIRROR_LAUNCHER_*`)
/// 4. CLI arguments
///
/// # Example
///
/// ```rust
/// use mirror_launcher::config::LauncherSettings;
///
/// let settings = LauncherSettings::default()
///     .with_server_port(9443)
///     .with_remote_domain("https://game.example.com/");
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherSettings {
    /// Address the mirror listener binds to.
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    /// Preferred mirror port. Falls back to an ephemeral port when taken.
    #[serde(default = "default_server_port")]
    pub server_port: u16,

    /// Remote origin being mirrored. Navigations starting with this prefix
    /// are redirected into the mirror.
    #[serde(default = "default_remote_domain")]
    pub remote_domain: String,

    /// Directory holding `active.json` and the script folders.
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: PathBuf,

    /// PEM certificate chain presented by the mirror.
    #[serde(default = "default_cert_path")]
    pub cert_path: PathBuf,

    /// PEM private key for `cert_path`.
    #[serde(default = "default_key_path")]
    pub key_path: PathBuf,

    /// Page loaded into the manager surface.
    #[serde(default = "default_manager_page")]
    pub manager_page: PathBuf,

    /// User preferences file.
    #[serde(default = "default_user_config_path")]
    pub user_config_path: PathBuf,

    /// Page global whose presence releases gated scripts.
    #[serde(default = "default_readiness_global")]
    pub readiness_global: String,

    /// Frames a gated script waits before giving up. Unbounded when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate_max_frames: Option<u32>,

    /// Rebinds allowed when the port is taken. Unbounded when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rebind_limit: Option<u32>,

    /// Timeout for upstream fetches in milliseconds.
    #[serde(default = "default_upstream_timeout_ms")]
    pub upstream_timeout_ms: u64,

    /// Which surface certificate errors are accepted.
    #[serde(default)]
    pub certificate_policy: CertificatePolicy,

    /// Open developer tools on every surface.
    #[serde(default)]
    pub devtools: bool,

    #[serde(default = "SurfaceConfig::manager")]
    pub manager_window: SurfaceConfig,

    #[serde(default = "SurfaceConfig::game")]
    pub game_window: SurfaceConfig,

    #[serde(default = "SurfaceConfig::tool")]
    pub tool_window: SurfaceConfig,

    /// Candidate game surface titles.
    #[serde(default = "default_titles")]
    pub titles: Vec<WeightedTitle>,
}

// Default value functions for serde
fn default_bind_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8887
}

fn default_remote_domain() -> String {
    "https://majsoul.union-game.com/".to_string()
}

fn default_scripts_dir() -> PathBuf {
    PathBuf::from("execute")
}

fn default_cert_path() -> PathBuf {
    PathBuf::from("certificate/cert.crt")
}

fn default_key_path() -> PathBuf {
    PathBuf::from("certificate/key.pem")
}

fn default_manager_page() -> PathBuf {
    PathBuf::from("manager/index.html")
}

fn default_user_config_path() -> PathBuf {
    PathBuf::from("configs-user.json")
}

fn default_readiness_global() -> String {
    "game".to_string()
}

fn default_upstream_timeout_ms() -> u64 {
    30000
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            server_port: default_server_port(),
            remote_domain: default_remote_domain(),
            scripts_dir: default_scripts_dir(),
            cert_path: default_cert_path(),
            key_path: default_key_path(),
            manager_page: default_manager_page(),
            user_config_path: default_user_config_path(),
            readiness_global: default_readiness_global(),
            gate_max_frames: None,
            rebind_limit: None,
            upstream_timeout_ms: default_upstream_timeout_ms(),
            certificate_policy: CertificatePolicy::default(),
            devtools: false,
            manager_window: SurfaceConfig::manager(),
            game_window: SurfaceConfig::game(),
            tool_window: SurfaceConfig::tool(),
            titles: default_titles(),
        }
    }
}

fn parse_bool(val: &str) -> bool {
    val.to_lowercase() == "true" || val == "1"
}

/// Returns true if `name` is a plain JavaScript identifier.
fn is_js_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

impl LauncherSettings {
    /// Creates settings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads settings from a configuration file.
    ///
    /// Supports both TOML and JSON formats, detected by file extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;

        match extension_of(path).as_str() {
            "toml" => Ok(toml::from_str(&content)?),
            "json" => Ok(serde_json::from_str(&content)?),
            ext => Err(ConfigError::UnsupportedFormat(ext.to_string())),
        }
    }

    /// Saves settings to a configuration file. The format follows the extension.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        let content = match extension_of(path).as_str() {
            "toml" => toml::to_string_pretty(self)?,
            "json" => serde_json::to_string_pretty(self)?,
            ext => return Err(ConfigError::UnsupportedFormat(ext.to_string())),
        };

        fs::write(path, content)?;
        Ok(())
    }

    /// Loads defaults with environment variable overrides applied.
    ///
    /// Variables are prefixed with `MIRROR_LAUNCHER_`, for example
    /// `MIRROR_LAUNCHER_SERVER_PORT` or `MIRROR_LAUNCHER_SCRIPTS_DIR`.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        settings.apply_env_overrides();
        settings
    }

    /// Applies environment variable overrides to current settings.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("MIRROR_LAUNCHER_BIND_HOST") {
            self.bind_host = val;
        }

        if let Ok(val) = env::var("MIRROR_LAUNCHER_SERVER_PORT") {
            if let Ok(port) = val.parse() {
                self.server_port = port;
            }
        }

        if let Ok(val) = env::var("MIRROR_LAUNCHER_REMOTE_DOMAIN") {
            self.remote_domain = val;
        }

        if let Ok(val) = env::var("MIRROR_LAUNCHER_SCRIPTS_DIR") {
            self.scripts_dir = PathBuf::from(val);
        }

        if let Ok(val) = env::var("MIRROR_LAUNCHER_CERT_PATH") {
            self.cert_path = PathBuf::from(val);
        }

        if let Ok(val) = env::var("MIRROR_LAUNCHER_KEY_PATH") {
            self.key_path = PathBuf::from(val);
        }

        if let Ok(val) = env::var("MIRROR_LAUNCHER_READINESS_GLOBAL") {
            self.readiness_global = val;
        }

        if let Ok(val) = env::var("MIRROR_LAUNCHER_GATE_MAX_FRAMES") {
            if let Ok(frames) = val.parse() {
                self.gate_max_frames = Some(frames);
            }
        }

        if let Ok(val) = env::var("MIRROR_LAUNCHER_REBIND_LIMIT") {
            if let Ok(limit) = val.parse() {
                self.rebind_limit = Some(limit);
            }
        }

        if let Ok(val) = env::var("MIRROR_LAUNCHER_UPSTREAM_TIMEOUT_MS") {
            if let Ok(timeout) = val.parse() {
                self.upstream_timeout_ms = timeout;
            }
        }

        if let Ok(val) = env::var("MIRROR_LAUNCHER_DEVTOOLS") {
            self.devtools = parse_bool(&val);
        }
    }

    /// Returns these settings with environment variable overrides applied.
    pub fn merge_with_env(mut self) -> Self {
        self.apply_env_overrides();
        self
    }

    /// Applies parsed CLI arguments as overrides.
    ///
    /// ```rust
    /// use mirror_launcher::config::{CliArgs, LauncherSettings};
    ///
    /// let args = CliArgs {
    ///     port: Some(9000),
    ///     devtools: Some(true),
    ///     ..Default::default()
    /// };
    ///
    /// let settings = LauncherSettings::default().merge_with_args(&args);
    /// assert_eq!(settings.server_port, 9000);
    /// ```
    pub fn merge_with_args(mut self, args: &CliArgs) -> Self {
        if let Some(port) = args.port {
            self.server_port = port;
        }
        if let Some(ref domain) = args.remote_domain {
            self.remote_domain = domain.clone();
        }
        if let Some(ref dir) = args.scripts_dir {
            self.scripts_dir = dir.clone();
        }
        if let Some(ref cert) = args.cert_path {
            self.cert_path = cert.clone();
        }
        if let Some(ref key) = args.key_path {
            self.key_path = key.clone();
        }
        if let Some(devtools) = args.devtools {
            self.devtools = devtools;
        }
        self
    }

    /// Validates all settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_host.is_empty() {
            return Err(ConfigError::ValidationError(
                "Bind host cannot be empty".to_string(),
            ));
        }

        if !self.remote_domain.starts_with("https://") && !self.remote_domain.starts_with("http://")
        {
            return Err(ConfigError::ValidationError(format!(
                "Remote domain must be an http(s) URL: {}",
                self.remote_domain
            )));
        }

        if !is_js_identifier(&self.readiness_global) {
            return Err(ConfigError::ValidationError(format!(
                "Readiness global is not a valid identifier: {}",
                self.readiness_global
            )));
        }

        if self.gate_max_frames == Some(0) {
            return Err(ConfigError::ValidationError(
                "Gate frame limit must be at least 1".to_string(),
            ));
        }

        if self.upstream_timeout_ms < 1000 {
            return Err(ConfigError::ValidationError(
                "Upstream timeout must be at least 1000ms".to_string(),
            ));
        }

        if self.titles.is_empty() {
            return Err(ConfigError::ValidationError(
                "At least one game title is required".to_string(),
            ));
        }
        if self.titles.iter().all(|t| t.weight == 0) {
            return Err(ConfigError::ValidationError(
                "Game title weights cannot all be 0".to_string(),
            ));
        }

        for (name, window) in [
            ("manager", &self.manager_window),
            ("game", &self.game_window),
            ("tool", &self.tool_window),
        ] {
            if window.width == 0 || window.height == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "The {} window must have a non-zero size",
                    name
                )));
            }
        }

        Ok(())
    }

    // Builder-style methods

    /// Sets the preferred mirror port.
    pub fn with_server_port(mut self, port: u16) -> Self {
        self.server_port = port;
        self
    }

    /// Sets the mirrored remote origin.
    pub fn with_remote_domain(mut self, domain: impl Into<String>) -> Self {
        self.remote_domain = domain.into();
        self
    }

    /// Sets the scripts directory.
    pub fn with_scripts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scripts_dir = dir.into();
        self
    }

    /// Sets the certificate and key paths.
    pub fn with_certificate(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.cert_path = cert.into();
        self.key_path = key.into();
        self
    }

    /// Sets the user preferences file.
    pub fn with_user_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.user_config_path = path.into();
        self
    }

    /// Caps rebind attempts.
    pub fn with_rebind_limit(mut self, limit: u32) -> Self {
        self.rebind_limit = Some(limit);
        self
    }

    /// Caps how long gated scripts wait.
    pub fn with_gate_max_frames(mut self, frames: u32) -> Self {
        self.gate_max_frames = Some(frames);
        self
    }

    /// Sets the certificate error policy.
    pub fn with_certificate_policy(mut self, policy: CertificatePolicy) -> Self {
        self.certificate_policy = policy;
        self
    }

    /// Enables or disables developer tools.
    pub fn with_devtools(mut self, devtools: bool) -> Self {
        self.devtools = devtools;
        self
    }

    /// Replaces the candidate game titles.
    pub fn with_titles(mut self, titles: Vec<WeightedTitle>) -> Self {
        self.titles = titles;
        self
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// CLI overrides. All fields are optional to allow partial overrides.
#[derive(Debug, Default, Clone)]
pub struct CliArgs {
    /// Preferred mirror port.
    pub port: Option<u16>,
    /// Remote origin.
    pub remote_domain: Option<String>,
    /// Scripts directory.
    pub scripts_dir: Option<PathBuf>,
    /// Certificate path.
    pub cert_path: Option<PathBuf>,
    /// Private key path.
    pub key_path: Option<PathBuf>,
    /// Open developer tools.
    pub devtools: Option<bool>,
    /// Configuration file path.
    pub config_file: Option<PathBuf>,
}

impl CliArgs {
    /// Creates an empty CliArgs instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the final settings: defaults or file, then environment, then
    /// these arguments, then validation.
    pub fn load_settings(&self) -> Result<LauncherSettings, ConfigError> {
        let mut settings = if let Some(ref config_file) = self.config_file {
            LauncherSettings::from_file(config_file)?
        } else {
            LauncherSettings::default()
        };

        settings = settings.merge_with_env();
        settings = settings.merge_with_args(self);
        settings.validate()?;

        Ok(settings)
    }
}

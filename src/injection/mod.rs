//! Injection of third-party scripts into the mirrored page.
//!
//! - [`manifest`] - Reading the ordered list of active scripts
//! - [`script`] - Preparing a script for immediate or readiness-gated execution
//! - [`scheduler`] - Running every active script on page load

pub mod manifest;
pub mod scheduler;
pub mod script;

pub use manifest::{ManifestError, ScriptDescriptor, ScriptRegistry, MANIFEST_FILE};
pub use scheduler::{InjectionReport, InjectionScheduler, SkippedScript};
pub use script::{
    wrap_gated, ExecutionMode, GateConfig, GateStep, InjectionError, PreparedScript,
    ReadinessGate, DEFAULT_ENTRY,
};

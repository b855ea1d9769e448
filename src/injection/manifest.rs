//! Manifest of active injection scripts.
//!
//! The manifest is `active.json` under the scripts directory: an ordered JSON
//! array of `{ "name", "filesDir", "entry"?, "sync"? }` objects. It is read
//! fresh for every page load so edits made from the management UI apply on
//! the next reload.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use crate::injection::script::DEFAULT_ENTRY;

/// File name of the manifest inside the scripts directory.
pub const MANIFEST_FILE: &str = "active.json";

/// One script unit listed in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptDescriptor {
    /// Display name, used for logging.
    pub name: String,

    /// Directory holding the script's files.
    pub files_dir: PathBuf,

    /// Entry file inside `files_dir`. Falls back to [`DEFAULT_ENTRY`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,

    /// Run immediately instead of waiting for the readiness global.
    #[serde(default)]
    pub sync: bool,
}

impl ScriptDescriptor {
    /// Creates a gated descriptor using the default entry file.
    pub fn new(name: impl Into<String>, files_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            files_dir: files_dir.into(),
            entry: None,
            sync: false,
        }
    }

    /// Sets the entry file name.
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    /// Marks the script as immediate.
    pub fn synchronous(mut self) -> Self {
        self.sync = true;
        self
    }

    /// Entry file name, defaulted when unset or empty.
    pub fn entry_name(&self) -> &str {
        self.entry
            .as_deref()
            .filter(|entry| !entry.is_empty())
            .unwrap_or(DEFAULT_ENTRY)
    }

    /// Full path of the entry file.
    pub fn entry_path(&self) -> PathBuf {
        self.files_dir.join(self.entry_name())
    }
}

/// Errors raised while reading the manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read manifest {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Loads the ordered list of active scripts from a scripts directory.
#[derive(Debug, Clone)]
pub struct ScriptRegistry {
    root: PathBuf,
}

impl ScriptRegistry {
    /// Creates a registry rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Scripts directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the manifest file.
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Reads and parses the manifest.
    ///
    /// Relative `filesDir` entries are resolved against the scripts directory.
    pub fn try_load_active(&self) -> Result<Vec<ScriptDescriptor>, ManifestError> {
        let path = self.manifest_path();
        let content = fs::read_to_string(&path).map_err(|source| ManifestError::Read {
            path: path.clone(),
            source,
        })?;
        let mut scripts: Vec<ScriptDescriptor> =
            serde_json::from_str(&content).map_err(|source| ManifestError::Parse {
                path: path.clone(),
                source,
            })?;

        for script in &mut scripts {
            if script.files_dir.is_relative() {
                script.files_dir = self.root.join(&script.files_dir);
            }
        }

        debug!("Loaded {} active scripts from {}", scripts.len(), path.display());
        Ok(scripts)
    }

    /// Reads the manifest, logging and returning an empty list on failure.
    pub fn load_active(&self) -> Vec<ScriptDescriptor> {
        self.try_load_active().unwrap_or_else(|e| {
            error!("{}", e);
            Vec::new()
        })
    }
}

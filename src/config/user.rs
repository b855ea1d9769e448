//! User preferences written by the management UI.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Preferences the launcher reads before creating any surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConfig {
    #[serde(default, rename = "isHardwareAccelerationDisable")]
    pub hardware_acceleration_disabled: bool,
}

impl UserConfig {
    /// Reads the preferences file.
    ///
    /// A missing or malformed file yields the defaults.
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No user config at {}: {}", path.display(), e);
                return Self::default();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            debug!("Ignoring malformed user config {}: {}", path.display(), e);
            Self::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_default() {
        let config = UserConfig::load(Path::new("/nonexistent/configs-user.json"));
        assert!(!config.hardware_acceleration_disabled);
    }

    #[test]
    fn test_flag_is_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("configs-user.json");
        fs::write(&path, r#"{"isHardwareAccelerationDisable": true, "other": 1}"#).unwrap();
        assert!(UserConfig::load(&path).hardware_acceleration_disabled);
    }

    #[test]
    fn test_malformed_or_mistyped_is_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("configs-user.json");

        fs::write(&path, "{not json").unwrap();
        assert!(!UserConfig::load(&path).hardware_acceleration_disabled);

        fs::write(&path, r#"{"isHardwareAccelerationDisable": "yes"}"#).unwrap();
        assert!(!UserConfig::load(&path).hardware_acceleration_disabled);
    }
}

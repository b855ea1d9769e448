//! Window configuration for display surfaces.
//!
//! [`SurfaceConfig`] is the full configuration handed to a [`SurfaceHost`]
//! when a surface is created. [`WindowOptions`] is the partial form sent by
//! tools over the control channel; it is merged over a default config
//! field by field.
//!
//! [`SurfaceHost`]: crate::surface::SurfaceHost

use serde::{Deserialize, Serialize};

use crate::surface::SurfaceId;

/// Full configuration for a display surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceConfig {
    /// Surface width in pixels.
    #[serde(default = "default_width")]
    pub width: u32,

    /// Surface height in pixels.
    #[serde(default = "default_height")]
    pub height: u32,

    /// Window title. `None` lets the host or the page decide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Draw native window chrome.
    #[serde(default = "default_true")]
    pub frame: bool,

    /// Allow the user to resize the surface.
    #[serde(default = "default_true")]
    pub resizable: bool,

    /// Host-specific title bar style (e.g. `hidden`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_bar_style: Option<String>,

    /// Background color shown before first paint, as a CSS color string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,

    /// Parent surface. Set by the orchestrator, never read from config files.
    #[serde(skip)]
    pub parent: Option<SurfaceId>,
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_true() -> bool {
    true
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            title: None,
            frame: true,
            resizable: true,
            title_bar_style: None,
            background_color: None,
            parent: None,
        }
    }
}

impl SurfaceConfig {
    /// Creates a config with the given size and defaults elsewhere.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Default configuration for the management surface.
    ///
    /// On macOS the manager keeps its frame but hides the title bar.
    pub fn manager() -> Self {
        let mut config = Self {
            width: 960,
            height: 540,
            frame: false,
            resizable: false,
            ..Self::default()
        };
        if cfg!(target_os = "macos") {
            config.frame = true;
            config.title_bar_style = Some("hidden".to_string());
        }
        config
    }

    /// Default configuration for the game surface.
    pub fn game() -> Self {
        Self {
            width: 1280,
            height: 720,
            background_color: Some("#000000".to_string()),
            ..Self::default()
        }
    }

    /// Default configuration for tool surfaces.
    pub fn tool() -> Self {
        Self::new(960, 540)
    }

    /// Sets the window title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the parent surface.
    pub fn with_parent(mut self, parent: SurfaceId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Returns a copy of this config with `options` applied on top.
    pub fn merged(&self, options: &WindowOptions) -> Self {
        let mut config = self.clone();
        if let Some(width) = options.width {
            config.width = width;
        }
        if let Some(height) = options.height {
            config.height = height;
        }
        if let Some(ref title) = options.title {
            config.title = Some(title.clone());
        }
        if let Some(frame) = options.frame {
            config.frame = frame;
        }
        if let Some(resizable) = options.resizable {
            config.resizable = resizable;
        }
        if let Some(ref style) = options.title_bar_style {
            config.title_bar_style = Some(style.clone());
        }
        if let Some(ref color) = options.background_color {
            config.background_color = Some(color.clone());
        }
        config
    }
}

/// Partial window configuration supplied by a tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resizable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_bar_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
}

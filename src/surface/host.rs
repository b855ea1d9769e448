//! Display surface host abstraction.
//!
//! The window host (creating native surfaces, menus, chrome) lives outside
//! this crate. [`SurfaceHost`] is the seam the orchestrator drives it
//! through, and [`SurfaceEvent`] is what the host reports back.
//!
//! [`MockSurfaceHost`] records every call without opening any window. It
//! backs the test suite and the binary's headless mode, and simulates the
//! in-page animation-frame loop for gated scripts.
//!
//! # Example
//!
//! ```rust
//! use mirror_launcher::surface::{MockSurfaceHost, SurfaceConfig, SurfaceHost};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let host = MockSurfaceHost::new();
//! let surface = host.create_surface(&SurfaceConfig::game()).await?;
//! host.load_url(surface, "https://localhost:8887/0/").await?;
//!
//! assert_eq!(
//!     host.surface(surface).unwrap().url.as_deref(),
//!     Some("https://localhost:8887/0/")
//! );
//! # Ok(())
//! # }
//! ```

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::injection::script::{ExecutionMode, GateStep, PreparedScript, ReadinessGate};
use crate::surface::SurfaceConfig;

/// Handle to a surface created by a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceId(Uuid);

impl SurfaceId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SurfaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Process-wide switches applied to the host before any surface exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFlags {
    /// Turn off GPU acceleration.
    pub disable_hardware_acceleration: bool,
    /// Let surfaces load pages whose certificates fail validation.
    pub ignore_certificate_errors: bool,
}

/// Severity of a page console message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Verbose,
    Info,
    Warning,
    Error,
}

/// Events a host reports for its surfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// The page finished loading.
    DidFinishLoad { surface: SurfaceId },

    /// The page is about to navigate to `url`. Cancellable.
    WillNavigate { surface: SurfaceId, url: String },

    /// A certificate failed validation while loading `url`. Cancellable;
    /// the outcome decides whether the certificate is accepted.
    CertificateError {
        surface: SurfaceId,
        url: String,
        error: String,
    },

    /// The page changed its title. Cancellable.
    PageTitleUpdated { surface: SurfaceId, title: String },

    /// The page wrote to its console.
    ConsoleMessage {
        surface: SurfaceId,
        level: ConsoleLevel,
        message: String,
        line: u32,
        source_id: String,
    },

    /// The page's renderer crashed.
    Crashed { surface: SurfaceId },

    /// The surface was closed.
    Closed { surface: SurfaceId },
}

impl SurfaceEvent {
    /// Surface the event belongs to.
    pub fn surface(&self) -> SurfaceId {
        match self {
            SurfaceEvent::DidFinishLoad { surface }
            | SurfaceEvent::WillNavigate { surface, .. }
            | SurfaceEvent::CertificateError { surface, .. }
            | SurfaceEvent::PageTitleUpdated { surface, .. }
            | SurfaceEvent::ConsoleMessage { surface, .. }
            | SurfaceEvent::Crashed { surface }
            | SurfaceEvent::Closed { surface } => *surface,
        }
    }
}

/// What the host should do after an event has been handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventOutcome {
    /// Cancel the event's default action.
    pub prevent_default: bool,
    /// Trust the certificate of a `CertificateError` event.
    pub accept_certificate: bool,
    /// No surfaces remain; the host should exit.
    pub quit: bool,
}

impl EventOutcome {
    /// Let the default action proceed.
    pub fn proceed() -> Self {
        Self::default()
    }

    /// Cancel the default action.
    pub fn prevent_default() -> Self {
        Self {
            prevent_default: true,
            ..Self::default()
        }
    }

    /// Cancel the default rejection and trust the certificate.
    pub fn accept_certificate() -> Self {
        Self {
            prevent_default: true,
            accept_certificate: true,
            quit: false,
        }
    }

    /// Ask the host to exit.
    pub fn quit() -> Self {
        Self {
            quit: true,
            ..Self::default()
        }
    }
}

/// Interface to the window host.
#[async_trait]
pub trait SurfaceHost: Send + Sync {
    /// Applies process-wide switches. Called once, before any surface exists.
    async fn configure(&self, flags: &HostFlags) -> Result<()>;

    /// Creates a surface and returns its handle. Nothing is loaded yet.
    async fn create_surface(&self, config: &SurfaceConfig) -> Result<SurfaceId>;

    /// Loads `url` into a surface.
    async fn load_url(&self, surface: SurfaceId, url: &str) -> Result<()>;

    /// Closes a surface. The host still reports [`SurfaceEvent::Closed`].
    async fn close_surface(&self, surface: SurfaceId) -> Result<()>;

    /// Evaluates JavaScript in the surface's page context.
    async fn execute_javascript(&self, surface: SurfaceId, code: &str) -> Result<()>;

    /// Opens developer tools for a surface, detached.
    async fn open_devtools(&self, surface: SurfaceId) -> Result<()>;

    /// Runs a prepared injection script in the surface's page.
    ///
    /// The default evaluates the wrapped script, which performs any readiness
    /// polling inside the page.
    async fn inject(&self, surface: SurfaceId, script: &PreparedScript) -> Result<()> {
        self.execute_javascript(surface, script.script()).await
    }
}

/// A surface as recorded by [`MockSurfaceHost`].
#[derive(Debug, Clone)]
pub struct MockSurface {
    pub id: SurfaceId,
    pub config: SurfaceConfig,
    /// Last URL loaded.
    pub url: Option<String>,
    /// Every URL loaded, in order.
    pub history: Vec<String>,
    pub closed: bool,
    pub devtools_open: bool,
    /// Executed scripts: prepared scripts by name, raw JavaScript verbatim.
    pub executed: Vec<String>,
}

struct PendingGate {
    surface: SurfaceId,
    name: String,
    gate: ReadinessGate,
}

#[derive(Default)]
struct MockState {
    surfaces: HashMap<SurfaceId, MockSurface>,
    created: Vec<SurfaceId>,
    flags: Option<HostFlags>,
    pending: Vec<PendingGate>,
    failing_scripts: Vec<String>,
}

/// Surface host that records calls instead of opening windows.
#[derive(Default)]
pub struct MockSurfaceHost {
    state: Mutex<MockState>,
}

impl MockSurfaceHost {
    /// Creates an empty mock host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags passed to [`SurfaceHost::configure`], if it was called.
    pub fn flags(&self) -> Option<HostFlags> {
        self.state.lock().flags
    }

    /// Snapshot of a surface.
    pub fn surface(&self, id: SurfaceId) -> Option<MockSurface> {
        self.state.lock().surfaces.get(&id).cloned()
    }

    /// Every surface ever created, in creation order.
    pub fn surfaces(&self) -> Vec<MockSurface> {
        let state = self.state.lock();
        state
            .created
            .iter()
            .filter_map(|id| state.surfaces.get(id).cloned())
            .collect()
    }

    /// Surfaces not yet closed, in creation order.
    pub fn open_surfaces(&self) -> Vec<MockSurface> {
        self.surfaces().into_iter().filter(|s| !s.closed).collect()
    }

    /// Scripts executed in a surface, in execution order.
    pub fn executed(&self, id: SurfaceId) -> Vec<String> {
        self.surface(id).map(|s| s.executed).unwrap_or_default()
    }

    /// Gated scripts still polling in a surface.
    pub fn pending_gates(&self, id: SurfaceId) -> usize {
        self.state
            .lock()
            .pending
            .iter()
            .filter(|p| p.surface == id)
            .count()
    }

    /// Makes every later injection of the script called `name` fail.
    pub fn fail_script(&self, name: impl Into<String>) {
        self.state.lock().failing_scripts.push(name.into());
    }

    /// Simulates one animation frame in a surface's page.
    ///
    /// `ready` is whether the readiness global exists on this frame. Returns
    /// the names of the gated scripts that executed on this frame.
    pub fn advance_frame(&self, id: SurfaceId, ready: bool) -> Vec<String> {
        let mut state = self.state.lock();
        let mut fired = Vec::new();

        for pending in state.pending.iter_mut().filter(|p| p.surface == id) {
            if pending.gate.tick(ready) == GateStep::Execute {
                fired.push(pending.name.clone());
            }
        }
        state.pending.retain(|p| p.gate.is_pending());

        if let Some(surface) = state.surfaces.get_mut(&id) {
            surface.executed.extend(fired.iter().cloned());
        }
        fired
    }

    fn open_surface_mut(state: &mut MockState, id: SurfaceId) -> Result<&mut MockSurface> {
        let surface = state
            .surfaces
            .get_mut(&id)
            .ok_or_else(|| anyhow!("Surface not found: {}", id))?;
        if surface.closed {
            return Err(anyhow!("Surface is closed: {}", id));
        }
        Ok(surface)
    }
}

#[async_trait]
impl SurfaceHost for MockSurfaceHost {
    async fn configure(&self, flags: &HostFlags) -> Result<()> {
        self.state.lock().flags = Some(*flags);
        Ok(())
    }

    async fn create_surface(&self, config: &SurfaceConfig) -> Result<SurfaceId> {
        let mut state = self.state.lock();
        if let Some(parent) = config.parent {
            Self::open_surface_mut(&mut state, parent)?;
        }

        let id = SurfaceId::new();
        state.surfaces.insert(
            id,
            MockSurface {
                id,
                config: config.clone(),
                url: None,
                history: Vec::new(),
                closed: false,
                devtools_open: false,
                executed: Vec::new(),
            },
        );
        state.created.push(id);
        Ok(id)
    }

    async fn load_url(&self, surface: SurfaceId, url: &str) -> Result<()> {
        let mut state = self.state.lock();
        let record = Self::open_surface_mut(&mut state, surface)?;
        record.url = Some(url.to_string());
        record.history.push(url.to_string());
        // Navigating away drops the page's scripting context.
        state.pending.retain(|p| p.surface != surface);
        Ok(())
    }

    async fn close_surface(&self, surface: SurfaceId) -> Result<()> {
        let mut state = self.state.lock();
        Self::open_surface_mut(&mut state, surface)?.closed = true;
        state.pending.retain(|p| p.surface != surface);
        Ok(())
    }

    async fn execute_javascript(&self, surface: SurfaceId, code: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::open_surface_mut(&mut state, surface)?
            .executed
            .push(code.to_string());
        Ok(())
    }

    async fn open_devtools(&self, surface: SurfaceId) -> Result<()> {
        let mut state = self.state.lock();
        Self::open_surface_mut(&mut state, surface)?.devtools_open = true;
        Ok(())
    }

    async fn inject(&self, surface: SurfaceId, script: &PreparedScript) -> Result<()> {
        let mut state = self.state.lock();
        if state.failing_scripts.iter().any(|n| n == script.name()) {
            return Err(anyhow!("Injected script failed: {}", script.name()));
        }
        match script.mode() {
            ExecutionMode::Immediate => Self::open_surface_mut(&mut state, surface)?
                .executed
                .push(script.name().to_string()),
            ExecutionMode::Gated(gate) => {
                Self::open_surface_mut(&mut state, surface)?;
                state.pending.push(PendingGate {
                    surface,
                    name: script.name().to_string(),
                    gate: gate.gate(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injection::script::GateConfig;

    #[tokio::test]
    async fn test_mock_host_create_load_close() {
        let host = MockSurfaceHost::new();
        let id = host.create_surface(&SurfaceConfig::game()).await.unwrap();

        host.load_url(id, "https://localhost:1/0/").await.unwrap();
        assert_eq!(host.surface(id).unwrap().history.len(), 1);

        host.close_surface(id).await.unwrap();
        assert!(host.surface(id).unwrap().closed);
        assert!(host.load_url(id, "https://localhost:1/0/").await.is_err());
        assert!(host.open_surfaces().is_empty());
    }

    #[tokio::test]
    async fn test_mock_host_rejects_missing_parent() {
        let host = MockSurfaceHost::new();
        let config = SurfaceConfig::tool().with_parent(SurfaceId::new());
        assert!(host.create_surface(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_host_simulates_gated_injection() {
        let host = MockSurfaceHost::new();
        let id = host.create_surface(&SurfaceConfig::game()).await.unwrap();
        let script = PreparedScript::from_source(
            "hud",
            "/s/hud/script.js",
            "hud()",
            ExecutionMode::Gated(GateConfig::default()),
        );

        host.inject(id, &script).await.unwrap();
        assert_eq!(host.pending_gates(id), 1);
        assert!(host.advance_frame(id, false).is_empty());
        assert_eq!(host.advance_frame(id, true), vec!["hud".to_string()]);
        assert!(host.advance_frame(id, true).is_empty());
        assert_eq!(host.executed(id), vec!["hud".to_string()]);
        assert_eq!(host.pending_gates(id), 0);
    }

    #[test]
    fn test_event_surface_accessor() {
        let id = SurfaceId::new();
        let event = SurfaceEvent::WillNavigate {
            surface: id,
            url: "https://example.com".to_string(),
        };
        assert_eq!(event.surface(), id);
    }

    #[test]
    fn test_event_outcomes() {
        assert!(!EventOutcome::proceed().prevent_default);
        assert!(EventOutcome::prevent_default().prevent_default);
        let accept = EventOutcome::accept_certificate();
        assert!(accept.prevent_default && accept.accept_certificate);
        assert!(EventOutcome::quit().quit);
    }
}

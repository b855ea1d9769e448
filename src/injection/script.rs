//! Preparation of injection scripts for execution in a page.
//!
//! A [`ScriptDescriptor`] becomes a [`PreparedScript`] once its entry file
//! has been read and its source wrapped for the descriptor's execution mode:
//!
//! - **Immediate** scripts run as-is, before the in-page application object
//!   exists. They are used to patch loading behavior.
//! - **Gated** scripts are wrapped in a `requestAnimationFrame` loop that
//!   checks for the readiness global on every frame and runs the body once,
//!   the first time the global is present.
//!
//! [`ReadinessGate`] models the same frame loop on the Rust side. Hosts that
//! cannot evaluate JavaScript (the mock host, tests) drive it directly.

use std::fs;
use std::path::PathBuf;

use crate::injection::manifest::ScriptDescriptor;

/// Entry file name used when a descriptor does not name one.
pub const DEFAULT_ENTRY: &str = "script.js";

/// Errors raised while preparing a single script.
#[derive(Debug, thiserror::Error)]
pub enum InjectionError {
    /// The entry file could not be read.
    #[error("Failed to read entry file {}: {source}", path.display())]
    EntryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Readiness gate parameters shared by every gated script of a page load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    /// Name of the `window` property whose presence signals readiness.
    pub readiness_global: String,
    /// Frames to poll before giving up. `None` polls forever.
    pub max_frames: Option<u32>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            readiness_global: "game".to_string(),
            max_frames: None,
        }
    }
}

impl GateConfig {
    /// Creates an unbounded gate on `readiness_global`.
    pub fn new(readiness_global: impl Into<String>) -> Self {
        Self {
            readiness_global: readiness_global.into(),
            max_frames: None,
        }
    }

    /// Caps polling at `frames` animation frames.
    pub fn with_max_frames(mut self, frames: u32) -> Self {
        self.max_frames = Some(frames);
        self
    }

    /// Creates a fresh gate state machine with these parameters.
    pub fn gate(&self) -> ReadinessGate {
        ReadinessGate::new(self.max_frames)
    }
}

/// How a script is executed once the page has loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Run the raw source right away.
    Immediate,
    /// Poll animation frames until the readiness global exists, then run once.
    Gated(GateConfig),
}

/// A script ready to hand to a surface host.
#[derive(Debug, Clone)]
pub struct PreparedScript {
    name: String,
    entry_path: PathBuf,
    source: String,
    mode: ExecutionMode,
    script: String,
}

impl PreparedScript {
    /// Reads the descriptor's entry file and wraps it for its execution mode.
    pub fn prepare(descriptor: &ScriptDescriptor, gate: &GateConfig) -> Result<Self, InjectionError> {
        let entry_path = descriptor.entry_path();
        let source = fs::read_to_string(&entry_path).map_err(|source| InjectionError::EntryRead {
            path: entry_path.clone(),
            source,
        })?;

        let mode = if descriptor.sync {
            ExecutionMode::Immediate
        } else {
            ExecutionMode::Gated(gate.clone())
        };

        Ok(Self::from_source(&descriptor.name, entry_path, source, mode))
    }

    /// Builds a prepared script from source text already in memory.
    pub fn from_source(
        name: impl Into<String>,
        entry_path: impl Into<PathBuf>,
        source: impl Into<String>,
        mode: ExecutionMode,
    ) -> Self {
        let source = source.into();
        let script = match mode {
            ExecutionMode::Immediate => source.clone(),
            ExecutionMode::Gated(ref gate) => wrap_gated(&source, gate),
        };
        Self {
            name: name.into(),
            entry_path: entry_path.into(),
            source,
            mode,
            script,
        }
    }

    /// Display name, used for logging.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path of the entry file.
    pub fn entry_path(&self) -> &PathBuf {
        &self.entry_path
    }

    /// Raw source text of the entry file.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Execution mode chosen for this script.
    pub fn mode(&self) -> &ExecutionMode {
        &self.mode
    }

    /// Returns true if execution waits for the readiness global.
    pub fn is_gated(&self) -> bool {
        matches!(self.mode, ExecutionMode::Gated(_))
    }

    /// The executable form to evaluate in the page.
    pub fn script(&self) -> &str {
        &self.script
    }
}

/// Wraps `source` in a readiness-gated `requestAnimationFrame` loop.
///
/// The body sits on its own lines so a trailing `//` comment in the source
/// cannot swallow the wrapper's closing braces.
pub fn wrap_gated(source: &str, gate: &GateConfig) -> String {
    let global = &gate.readiness_global;
    match gate.max_frames {
        None => format!(
            "(() => {{\n\
             const __tick = () => {{\n\
             if (window.{global}) {{\n\
             (() => {{\n{source}\n}})()\n\
             }} else {{\n\
             requestAnimationFrame(__tick)\n\
             }}\n\
             }}\n\
             requestAnimationFrame(__tick)\n\
             }})()"
        ),
        Some(max) => format!(
            "(() => {{\n\
             let __frames = 0\n\
             const __tick = () => {{\n\
             if (window.{global}) {{\n\
             (() => {{\n{source}\n}})()\n\
             return\n\
             }}\n\
             if (++__frames >= {max}) {{\n\
             console.warn('readiness gate: window.{global} not found after {max} frames')\n\
             return\n\
             }}\n\
             requestAnimationFrame(__tick)\n\
             }}\n\
             requestAnimationFrame(__tick)\n\
             }})()"
        ),
    }
}

/// Outcome of one animation frame for a gated script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStep {
    /// Not ready yet; poll again next frame.
    Reschedule,
    /// Ready; run the body now.
    Execute,
    /// Frame cap reached without readiness; stop polling.
    GiveUp,
    /// The gate already fired or gave up; nothing to do.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Waiting,
    Executed,
    Abandoned,
}

/// Frame-tick state machine for gated execution.
///
/// Fires [`GateStep::Execute`] at most once, and never before a tick that
/// observes readiness.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    max_frames: Option<u32>,
    frames: u32,
    state: GateState,
}

impl ReadinessGate {
    /// Creates a gate, optionally capped at `max_frames` frames.
    pub fn new(max_frames: Option<u32>) -> Self {
        Self {
            max_frames,
            frames: 0,
            state: GateState::Waiting,
        }
    }

    /// Advances one animation frame. `ready` is whether the readiness global
    /// exists on this frame.
    pub fn tick(&mut self, ready: bool) -> GateStep {
        if self.state != GateState::Waiting {
            return GateStep::Idle;
        }
        self.frames += 1;
        if ready {
            self.state = GateState::Executed;
            return GateStep::Execute;
        }
        match self.max_frames {
            Some(max) if self.frames >= max => {
                self.state = GateState::Abandoned;
                GateStep::GiveUp
            }
            _ => GateStep::Reschedule,
        }
    }

    /// Frames observed so far.
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Returns true once the body has been released for execution.
    pub fn has_executed(&self) -> bool {
        self.state == GateState::Executed
    }

    /// Returns true while the gate is still polling.
    pub fn is_pending(&self) -> bool {
        self.state == GateState::Waiting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_waits_for_readiness_then_fires_once() {
        let mut gate = ReadinessGate::new(None);

        for _ in 0..500 {
            assert_eq!(gate.tick(false), GateStep::Reschedule);
        }
        assert!(!gate.has_executed());

        assert_eq!(gate.tick(true), GateStep::Execute);
        assert!(gate.has_executed());

        for _ in 0..10 {
            assert_eq!(gate.tick(true), GateStep::Idle);
        }
        assert_eq!(gate.frames(), 501);
    }

    #[test]
    fn test_bounded_gate_gives_up() {
        let mut gate = ReadinessGate::new(Some(3));
        assert_eq!(gate.tick(false), GateStep::Reschedule);
        assert_eq!(gate.tick(false), GateStep::Reschedule);
        assert_eq!(gate.tick(false), GateStep::GiveUp);
        assert_eq!(gate.tick(true), GateStep::Idle);
        assert!(!gate.has_executed());
        assert!(!gate.is_pending());
    }

    #[test]
    fn test_bounded_gate_fires_on_last_frame() {
        let mut gate = ReadinessGate::new(Some(2));
        assert_eq!(gate.tick(false), GateStep::Reschedule);
        assert_eq!(gate.tick(true), GateStep::Execute);
    }

    #[test]
    fn test_immediate_script_is_raw_source() {
        let script = PreparedScript::from_source(
            "patch",
            "/scripts/patch/script.js",
            "console.log(1)",
            ExecutionMode::Immediate,
        );
        assert_eq!(script.script(), "console.log(1)");
        assert!(!script.is_gated());
    }

    #[test]
    fn test_gated_wrapper_checks_readiness_global() {
        let gate = GateConfig::new("game");
        let script = PreparedScript::from_source(
            "hud",
            "/scripts/hud/script.js",
            "hud() // trailing comment",
            ExecutionMode::Gated(gate),
        );

        let js = script.script();
        assert!(js.contains("if (window.game)"));
        assert!(js.contains("requestAnimationFrame(__tick)"));
        assert!(js.contains("hud() // trailing comment\n"));
        assert!(!js.contains("__frames"));
        assert!(script.is_gated());
    }

    #[test]
    fn test_bounded_wrapper_counts_frames() {
        let gate = GateConfig::new("app").with_max_frames(600);
        let js = wrap_gated("run()", &gate);
        assert!(js.contains("if (window.app)"));
        assert!(js.contains("++__frames >= 600"));
    }
}

//! Registry of live display surfaces, keyed by role.
//!
//! The registry is owned by the orchestrator and mutated only from its task,
//! so it carries no locking. A surface's entry is removed as soon as the host
//! reports it closed; lookups never observe a closed surface.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::surface::SurfaceId;

/// Logical role of a display surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SurfaceRole {
    /// The management UI. At most one.
    Manager,
    /// The mirrored game. At most one.
    Game,
    /// An auxiliary tool, keyed by its files directory.
    Tool(PathBuf),
}

impl fmt::Display for SurfaceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceRole::Manager => write!(f, "manager"),
            SurfaceRole::Game => write!(f, "game"),
            SurfaceRole::Tool(dir) => write!(f, "tool:{}", dir.display()),
        }
    }
}

/// A registered surface.
#[derive(Debug, Clone)]
pub struct SurfaceRecord {
    /// Host handle of the surface.
    pub id: SurfaceId,
    /// Role the surface was registered under.
    pub role: SurfaceRole,
    /// When the surface was registered.
    pub registered_at: DateTime<Utc>,
}

impl SurfaceRecord {
    fn new(id: SurfaceId, role: SurfaceRole) -> Self {
        Self {
            id,
            role,
            registered_at: Utc::now(),
        }
    }
}

/// Mapping from role to live surface handle.
#[derive(Debug, Default)]
pub struct SurfaceRegistry {
    manager: Option<SurfaceRecord>,
    game: Option<SurfaceRecord>,
    tools: HashMap<PathBuf, SurfaceRecord>,
}

impl SurfaceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `id` under `role`.
    ///
    /// Returns the id previously registered under the same role, if any. The
    /// caller decides what happens to that surface; the registry only forgets
    /// it.
    pub fn register(&mut self, role: SurfaceRole, id: SurfaceId) -> Option<SurfaceId> {
        let record = SurfaceRecord::new(id, role.clone());
        let previous = match role {
            SurfaceRole::Manager => self.manager.replace(record),
            SurfaceRole::Game => self.game.replace(record),
            SurfaceRole::Tool(dir) => self.tools.insert(dir, record),
        };
        previous.map(|r| r.id)
    }

    /// Looks up the surface registered under `role`.
    pub fn get(&self, role: &SurfaceRole) -> Option<SurfaceId> {
        match role {
            SurfaceRole::Manager => self.manager.as_ref().map(|r| r.id),
            SurfaceRole::Game => self.game.as_ref().map(|r| r.id),
            SurfaceRole::Tool(dir) => self.tools.get(dir).map(|r| r.id),
        }
    }

    /// Returns the manager surface, if open.
    pub fn manager(&self) -> Option<SurfaceId> {
        self.get(&SurfaceRole::Manager)
    }

    /// Returns the game surface, if open.
    pub fn game(&self) -> Option<SurfaceId> {
        self.get(&SurfaceRole::Game)
    }

    /// Returns the tool surface registered for `files_dir`, if open.
    pub fn tool(&self, files_dir: &Path) -> Option<SurfaceId> {
        self.tools.get(files_dir).map(|r| r.id)
    }

    /// Finds the role under which `id` is currently registered.
    pub fn role_of(&self, id: SurfaceId) -> Option<SurfaceRole> {
        self.records().find(|r| r.id == id).map(|r| r.role.clone())
    }

    /// Removes the entry holding `id`.
    ///
    /// Entries are matched by id, not by role: a stale handle whose role slot
    /// has since been taken by another surface leaves that slot untouched.
    pub fn remove(&mut self, id: SurfaceId) -> Option<SurfaceRole> {
        if self.manager.as_ref().is_some_and(|r| r.id == id) {
            return self.manager.take().map(|r| r.role);
        }
        if self.game.as_ref().is_some_and(|r| r.id == id) {
            return self.game.take().map(|r| r.role);
        }
        let dir = self
            .tools
            .iter()
            .find(|(_, r)| r.id == id)
            .map(|(dir, _)| dir.clone())?;
        self.tools.remove(&dir).map(|r| r.role)
    }

    /// Iterates over every registered surface.
    pub fn records(&self) -> impl Iterator<Item = &SurfaceRecord> {
        self.manager
            .iter()
            .chain(self.game.iter())
            .chain(self.tools.values())
    }

    /// Number of registered tool surfaces.
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Total number of registered surfaces.
    pub fn len(&self) -> usize {
        self.records().count()
    }

    /// Returns true if no surface is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Per-page-load injection of the active scripts.
//!
//! Scripts are handed to the host in manifest order. Immediate scripts
//! therefore run in that order; gated scripts each poll on their own and may
//! fire in any order once the page is ready. A failure affects only the
//! script it belongs to.

use tracing::{error, info, warn};

use crate::injection::manifest::ScriptRegistry;
use crate::injection::script::{GateConfig, PreparedScript};
use crate::surface::{SurfaceHost, SurfaceId};

/// A script left out of a page load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedScript {
    pub name: String,
    pub reason: String,
}

/// Result of one injection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectionReport {
    /// Scripts handed to the host, in order.
    pub injected: Vec<String>,
    /// Scripts skipped because their entry could not be read or the host
    /// rejected them.
    pub skipped: Vec<SkippedScript>,
}

impl InjectionReport {
    fn skip(&mut self, name: &str, reason: impl ToString) {
        self.skipped.push(SkippedScript {
            name: name.to_string(),
            reason: reason.to_string(),
        });
    }
}

/// Runs the registry's active scripts against a surface.
#[derive(Debug, Clone)]
pub struct InjectionScheduler {
    registry: ScriptRegistry,
    gate: GateConfig,
}

impl InjectionScheduler {
    pub fn new(registry: ScriptRegistry, gate: GateConfig) -> Self {
        Self { registry, gate }
    }

    /// The script registry.
    pub fn registry(&self) -> &ScriptRegistry {
        &self.registry
    }

    /// Gate parameters applied to non-synchronous scripts.
    pub fn gate(&self) -> &GateConfig {
        &self.gate
    }

    /// Injects every active script into `surface`.
    ///
    /// Never fails: manifest and per-script errors are logged and reported.
    pub async fn run<H>(&self, host: &H, surface: SurfaceId) -> InjectionReport
    where
        H: SurfaceHost + ?Sized,
    {
        let mut report = InjectionReport::default();

        for descriptor in self.registry.load_active() {
            info!("Loading script {}", descriptor.name);

            let prepared = match PreparedScript::prepare(&descriptor, &self.gate) {
                Ok(prepared) => prepared,
                Err(e) => {
                    error!("Skipping script {}: {}", descriptor.name, e);
                    report.skip(&descriptor.name, e);
                    continue;
                }
            };

            if let Err(e) = host.inject(surface, &prepared).await {
                warn!("Script {} failed to run: {}", descriptor.name, e);
                report.skip(&descriptor.name, e);
                continue;
            }

            report.injected.push(descriptor.name);
        }

        report
    }
}

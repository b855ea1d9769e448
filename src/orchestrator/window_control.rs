//! Surface lifecycle orchestration.
//!
//! The [`Orchestrator`] owns everything with session state: the surface
//! registry, the mirror server, the injection scheduler and the navigation
//! guard. It is driven from a single task by two inputs, control messages
//! from the management UI and events from the surface host, and never
//! shares its state.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::{LauncherSettings, UserConfig};
use crate::injection::{GateConfig, InjectionScheduler, ScriptRegistry};
use crate::mirror::{host_flags, MirrorServer};
use crate::orchestrator::control::{ControlMessage, ControlProcessor, ControlResponse, ToolDescriptor};
use crate::orchestrator::navigation::{NavigationDecision, NavigationGuard};
use crate::orchestrator::title::TitlePicker;
use crate::surface::{
    ConsoleLevel, EventOutcome, SurfaceEvent, SurfaceHost, SurfaceId, SurfaceRegistry, SurfaceRole,
};

/// A surface event and, for cancellable events, where to send the outcome.
pub type EventEnvelope = (SurfaceEvent, Option<oneshot::Sender<EventOutcome>>);

/// Creates the channel a host uses to deliver surface events.
pub fn event_channel(buffer: usize) -> (mpsc::Sender<EventEnvelope>, mpsc::Receiver<EventEnvelope>) {
    mpsc::channel(buffer)
}

/// `file://` URL for a local page. Relative paths resolve against the
/// working directory.
fn file_url(path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|dir| dir.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    format!("file://{}", absolute.display())
}

/// A redirect decided while handling a navigation event, issued once the
/// host has been told to cancel the original navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Redirect {
    surface: SurfaceId,
    url: String,
}

/// Drives the manager, game and tool surfaces for one launcher session.
pub struct Orchestrator<H: SurfaceHost + ?Sized> {
    host: Arc<H>,
    settings: LauncherSettings,
    registry: SurfaceRegistry,
    /// Every surface created here and not yet closed, tracked or not.
    open: HashSet<SurfaceId>,
    server: MirrorServer,
    scheduler: InjectionScheduler,
    guard: NavigationGuard,
    titles: TitlePicker,
}

impl<H: SurfaceHost + ?Sized> Orchestrator<H> {
    /// Creates an orchestrator around an existing mirror server.
    pub fn new(host: Arc<H>, settings: LauncherSettings, server: MirrorServer) -> Result<Self> {
        let titles = TitlePicker::new(settings.titles.clone())
            .ok_or_else(|| anyhow!("Game titles must have a positive total weight"))?;

        let mut gate = GateConfig::new(settings.readiness_global.clone());
        if let Some(frames) = settings.gate_max_frames {
            gate = gate.with_max_frames(frames);
        }
        let scheduler = InjectionScheduler::new(ScriptRegistry::new(&settings.scripts_dir), gate);
        let guard = NavigationGuard::new(settings.remote_domain.clone());

        Ok(Self {
            host,
            settings,
            registry: SurfaceRegistry::new(),
            open: HashSet::new(),
            server,
            scheduler,
            guard,
            titles,
        })
    }

    /// Creates an orchestrator whose mirror forwards to the configured remote.
    pub fn from_settings(host: Arc<H>, settings: LauncherSettings) -> Result<Self> {
        let server = MirrorServer::from_settings(&settings).context("Failed to set up mirror server")?;
        Self::new(host, settings, server)
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    pub fn settings(&self) -> &LauncherSettings {
        &self.settings
    }

    pub fn registry(&self) -> &SurfaceRegistry {
        &self.registry
    }

    pub fn server(&self) -> &MirrorServer {
        &self.server
    }

    /// Number of surfaces opened by this orchestrator that are still open.
    pub fn open_surface_count(&self) -> usize {
        self.open.len()
    }

    /// Configures the host and opens the manager surface.
    pub async fn start(&mut self) -> Result<SurfaceId> {
        let user = UserConfig::load(&self.settings.user_config_path);
        let flags = host_flags(user.hardware_acceleration_disabled);

        warn!(
            "Certificate validation is relaxed: upstream certificates are not verified, surface policy is {}",
            self.settings.certificate_policy
        );
        if flags.disable_hardware_acceleration {
            info!("Hardware acceleration disabled by user config");
        }
        self.host
            .configure(&flags)
            .await
            .context("Failed to configure surface host")?;

        let manager = self
            .host
            .create_surface(&self.settings.manager_window)
            .await
            .context("Failed to create manager surface")?;
        self.open.insert(manager);
        self.host
            .load_url(manager, &file_url(&self.settings.manager_page))
            .await?;
        self.open_devtools(manager).await;
        self.registry.register(SurfaceRole::Manager, manager);

        info!("Manager surface {} opened", manager);
        Ok(manager)
    }

    /// Starts the mirror and opens the game surface on it, then closes the
    /// manager. Returns the game surface and the mirror port.
    ///
    /// A second call reuses both the listener and the game surface.
    pub async fn start_game(&mut self) -> Result<(SurfaceId, u16)> {
        self.launch_game().await.map(|(game, port, _)| (game, port))
    }

    /// Like [`start_game`](Self::start_game), also reporting whether the
    /// game surface was created by this call.
    async fn launch_game(&mut self) -> Result<(SurfaceId, u16, bool)> {
        let port = self.server.start().await?;

        if let Some(game) = self.registry.game() {
            info!("Game surface {} already open", game);
            return Ok((game, port, false));
        }

        let root_url = self
            .server
            .root_url()
            .ok_or_else(|| anyhow!("Mirror server stopped before the game surface opened"))?;

        let title = self.titles.pick(&mut rand::thread_rng()).to_string();
        let config = self.settings.game_window.clone().with_title(title);

        let game = self
            .host
            .create_surface(&config)
            .await
            .context("Failed to create game surface")?;
        self.open.insert(game);
        self.host.load_url(game, &root_url).await?;
        self.open_devtools(game).await;
        self.registry.register(SurfaceRole::Game, game);
        info!("Game surface {} loading {}", game, root_url);

        self.close_manager().await;

        Ok((game, port, true))
    }

    /// Opens a tool surface, parented to the manager when it is open.
    pub async fn start_tool(&mut self, tool: &ToolDescriptor) -> Result<SurfaceId> {
        let mut config = match tool.window_options {
            Some(ref options) => self.settings.tool_window.merged(options),
            None => self.settings.tool_window.clone(),
        };
        if let Some(manager) = self.registry.manager() {
            config = config.with_parent(manager);
        }

        let surface = self
            .host
            .create_surface(&config)
            .await
            .with_context(|| format!("Failed to create tool surface for {}", tool.files_dir.display()))?;
        self.open.insert(surface);
        self.open_devtools(surface).await;
        self.host.load_url(surface, &tool.page_url()).await?;

        let role = SurfaceRole::Tool(tool.files_dir.clone());
        if let Some(previous) = self.registry.register(role.clone(), surface) {
            warn!(
                "{} re-registered; surface {} stays open but is no longer tracked",
                role, previous
            );
        }

        info!("Tool surface {} opened for {}", surface, tool.files_dir.display());
        Ok(surface)
    }

    async fn close_manager(&mut self) {
        if let Some(manager) = self.registry.manager() {
            if let Err(e) = self.host.close_surface(manager).await {
                warn!("Failed to close manager surface {}: {:#}", manager, e);
            }
            self.registry.remove(manager);
            self.open.remove(&manager);
        }
    }

    async fn open_devtools(&self, surface: SurfaceId) {
        if !self.settings.devtools {
            return;
        }
        if let Err(e) = self.host.open_devtools(surface).await {
            warn!("Failed to open devtools for {}: {:#}", surface, e);
        }
    }

    /// Handles one control message. Failures become error responses.
    pub async fn handle_control(&mut self, message: ControlMessage) -> ControlResponse {
        debug!("Handling control message {}", message.tag());

        let result = match message {
            ControlMessage::StartGame => self.launch_game().await.map(|(game, port, created)| {
                ControlResponse::with_surface(game)
                    .and_port(port)
                    .opened(created)
            }),
            ControlMessage::StartTool(ref tool) => self
                .start_tool(tool)
                .await
                .map(|surface| ControlResponse::with_surface(surface).opened(true)),
        };

        result.unwrap_or_else(|e| {
            error!("Control message {} failed: {:#}", message.tag(), e);
            ControlResponse::error(format!("{:#}", e))
        })
    }

    /// Handles one surface event and returns what the host should do.
    ///
    /// An intercepted navigation is redirected before this returns. The run
    /// loop instead replies to the host first and redirects afterwards.
    pub async fn handle_event(&mut self, event: SurfaceEvent) -> EventOutcome {
        let (outcome, redirect) = self.dispatch_event(event).await;
        if let Some(redirect) = redirect {
            self.follow_redirect(redirect).await;
        }
        outcome
    }

    async fn follow_redirect(&self, redirect: Redirect) {
        if let Err(e) = self.host.load_url(redirect.surface, &redirect.url).await {
            error!("Failed to load redirect {}: {:#}", redirect.url, e);
        }
    }

    /// Decides the outcome of an event. A navigation redirect is returned
    /// rather than loaded so the cancellation reaches the host first.
    async fn dispatch_event(&mut self, event: SurfaceEvent) -> (EventOutcome, Option<Redirect>) {
        let role = self.registry.role_of(event.surface());

        if let SurfaceEvent::WillNavigate { surface, url } = event {
            if role != Some(SurfaceRole::Game) {
                return (EventOutcome::proceed(), None);
            }
            let Some(origin) = self.server.origin() else {
                return (EventOutcome::proceed(), None);
            };

            return match self.guard.decide(&url, &origin) {
                NavigationDecision::Allow => (EventOutcome::proceed(), None),
                NavigationDecision::Intercept { redirect_to } => {
                    info!("Redirecting {} to {}", url, redirect_to);
                    let redirect = Redirect {
                        surface,
                        url: redirect_to,
                    };
                    (EventOutcome::prevent_default(), Some(redirect))
                }
            };
        }

        (self.handle_other_event(event, role).await, None)
    }

    async fn handle_other_event(
        &mut self,
        event: SurfaceEvent,
        role: Option<SurfaceRole>,
    ) -> EventOutcome {

        match event {
            SurfaceEvent::DidFinishLoad { surface } => {
                if role == Some(SurfaceRole::Game) {
                    let report = self.scheduler.run(self.host.as_ref(), surface).await;
                    info!(
                        "Injected {} script(s), skipped {}",
                        report.injected.len(),
                        report.skipped.len()
                    );
                }
                EventOutcome::proceed()
            }

            SurfaceEvent::WillNavigate { .. } => EventOutcome::proceed(),

            SurfaceEvent::CertificateError { url, error, .. } => {
                let origin = self.server.origin();
                if self
                    .settings
                    .certificate_policy
                    .accepts(&url, origin.as_deref())
                {
                    debug!("Accepting certificate error for {}: {}", url, error);
                    EventOutcome::accept_certificate()
                } else {
                    warn!("Rejecting certificate for {}: {}", url, error);
                    EventOutcome::proceed()
                }
            }

            SurfaceEvent::PageTitleUpdated { .. } => match role {
                Some(SurfaceRole::Manager) | Some(SurfaceRole::Game) => EventOutcome::prevent_default(),
                _ => EventOutcome::proceed(),
            },

            SurfaceEvent::ConsoleMessage {
                surface,
                level,
                message,
                line,
                source_id,
            } => {
                match level {
                    ConsoleLevel::Error => {
                        warn!(target: "page_console", %surface, "{} ({}:{})", message, source_id, line)
                    }
                    ConsoleLevel::Verbose => {
                        debug!(target: "page_console", %surface, "{} ({}:{})", message, source_id, line)
                    }
                    ConsoleLevel::Info | ConsoleLevel::Warning => {
                        info!(target: "page_console", %surface, ?level, "{} ({}:{})", message, source_id, line)
                    }
                }
                EventOutcome::proceed()
            }

            SurfaceEvent::Crashed { surface } => {
                error!(
                    "Surface {} ({}) crashed",
                    surface,
                    role.map(|r| r.to_string()).unwrap_or_else(|| "untracked".to_string())
                );
                EventOutcome::proceed()
            }

            SurfaceEvent::Closed { surface } => {
                if let Some(role) = self.registry.remove(surface) {
                    info!("Surface {} ({}) closed", surface, role);
                }
                self.open.remove(&surface);
                if self.open.is_empty() && !cfg!(target_os = "macos") {
                    info!("All surfaces closed");
                    EventOutcome::quit()
                } else {
                    EventOutcome::proceed()
                }
            }
        }
    }

    /// Runs until the host asks to quit or both inputs are closed, then
    /// stops the mirror.
    pub async fn run(
        &mut self,
        mut control: ControlProcessor,
        mut events: mpsc::Receiver<EventEnvelope>,
    ) -> Result<()> {
        let mut control_open = true;

        loop {
            tokio::select! {
                pending = control.recv(), if control_open => {
                    match pending {
                        Some(pending) => {
                            let response = self.handle_control(pending.message.clone()).await;
                            pending.reply(response);
                        }
                        None => {
                            debug!("Control channel closed");
                            control_open = false;
                        }
                    }
                }
                envelope = events.recv() => {
                    let Some((event, reply)) = envelope else {
                        info!("Surface host disconnected");
                        break;
                    };
                    let (outcome, redirect) = self.dispatch_event(event).await;
                    if let Some(reply) = reply {
                        let _ = reply.send(outcome);
                    }
                    if let Some(redirect) = redirect {
                        self.follow_redirect(redirect).await;
                    }
                    if outcome.quit {
                        break;
                    }
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Stops the mirror if it is listening.
    pub async fn shutdown(&mut self) {
        if self.server.is_listening() {
            self.server.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::{load_server_config, MirrorRequest, MirrorResponse, RequestProcessor};
    use crate::surface::MockSurfaceHost;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct StaticProcessor;

    #[async_trait]
    impl RequestProcessor for StaticProcessor {
        async fn process(&self, _request: MirrorRequest) -> Result<MirrorResponse> {
            Ok(MirrorResponse::ok("text/html", "<html></html>"))
        }
    }

    fn orchestrator(scripts: &Path) -> Orchestrator<MockSurfaceHost> {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("certificate");
        let tls = load_server_config(&dir.join("cert.crt"), &dir.join("key.pem")).unwrap();
        let settings = LauncherSettings::default()
            .with_server_port(0)
            .with_scripts_dir(scripts)
            .with_user_config_path(scripts.join("configs-user.json"));
        let server = MirrorServer::new("127.0.0.1", 0, tls, Arc::new(StaticProcessor));
        Orchestrator::new(Arc::new(MockSurfaceHost::new()), settings, server).unwrap()
    }

    #[tokio::test]
    async fn test_start_opens_manager() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(dir.path());

        let manager = orch.start().await.unwrap();

        assert_eq!(orch.registry().manager(), Some(manager));
        let flags = orch.host().flags().unwrap();
        assert!(flags.ignore_certificate_errors);
        assert!(!flags.disable_hardware_acceleration);
        let url = orch.host().surface(manager).unwrap().url.unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("manager/index.html"));
    }

    #[tokio::test]
    async fn test_title_updates_prevented_for_manager_and_game_only() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(dir.path());
        let manager = orch.start().await.unwrap();
        let tool = orch.start_tool(&ToolDescriptor::new("/tools/a")).await.unwrap();

        let outcome = orch
            .handle_event(SurfaceEvent::PageTitleUpdated {
                surface: manager,
                title: "x".to_string(),
            })
            .await;
        assert!(outcome.prevent_default);

        let outcome = orch
            .handle_event(SurfaceEvent::PageTitleUpdated {
                surface: tool,
                title: "x".to_string(),
            })
            .await;
        assert!(!outcome.prevent_default);
    }

    #[tokio::test]
    async fn test_tool_is_parented_to_manager() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(dir.path());
        let manager = orch.start().await.unwrap();

        let tool = orch
            .start_tool(&ToolDescriptor::new("/tools/a").with_index("panel.html"))
            .await
            .unwrap();

        let surface = orch.host().surface(tool).unwrap();
        assert_eq!(surface.config.parent, Some(manager));
        assert_eq!(surface.url.as_deref(), Some("file:///tools/a/panel.html"));
        assert_eq!(orch.registry().tool(&PathBuf::from("/tools/a")), Some(tool));
    }

    #[tokio::test]
    async fn test_closing_last_surface_quits() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(dir.path());
        let manager = orch.start().await.unwrap();

        let outcome = orch.handle_event(SurfaceEvent::Closed { surface: manager }).await;

        assert!(orch.registry().is_empty());
        assert_eq!(outcome.quit, !cfg!(target_os = "macos"));
    }

    #[tokio::test]
    async fn test_certificate_errors_accepted_by_default() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(dir.path());
        let manager = orch.start().await.unwrap();

        let outcome = orch
            .handle_event(SurfaceEvent::CertificateError {
                surface: manager,
                url: "https://localhost:8887/0/".to_string(),
                error: "net::ERR_CERT_AUTHORITY_INVALID".to_string(),
            })
            .await;

        assert!(outcome.accept_certificate);
        assert!(outcome.prevent_default);
    }

    #[tokio::test]
    async fn test_control_errors_become_responses() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(dir.path());
        let manager = orch.start().await.unwrap();

        // The host closed the manager behind the registry's back, so it can
        // no longer parent a tool.
        orch.host().close_surface(manager).await.unwrap();
        let response = orch
            .handle_control(ControlMessage::StartTool(ToolDescriptor::new("/tools/a")))
            .await;

        assert!(!response.success);
        assert!(response.error.unwrap().contains("Failed to create tool surface"));
        assert!(orch.registry().tool(Path::new("/tools/a")).is_none());
    }

    #[tokio::test]
    async fn test_repeated_start_game_reports_reuse() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(dir.path());
        orch.start().await.unwrap();

        let first = orch.handle_control(ControlMessage::StartGame).await;
        let second = orch.handle_control(ControlMessage::StartGame).await;

        assert!(first.success && first.created);
        assert!(second.success && !second.created);
        assert_eq!(first.surface, second.surface);
        assert_eq!(first.port, second.port);

        orch.shutdown().await;
    }

    #[tokio::test]
    async fn test_redirect_is_deferred_until_outcome_is_known() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(dir.path());
        orch.start().await.unwrap();
        let (game, port) = orch.start_game().await.unwrap();
        let before = orch.host().surface(game).unwrap().url;

        let (outcome, redirect) = orch
            .dispatch_event(SurfaceEvent::WillNavigate {
                surface: game,
                url: "https://majsoul.union-game.com/1/?code=abc".to_string(),
            })
            .await;

        assert!(outcome.prevent_default);
        assert_eq!(orch.host().surface(game).unwrap().url, before);

        let redirect = redirect.unwrap();
        assert_eq!(redirect.url, format!("https://localhost:{}/0/?code=abc", port));
        orch.follow_redirect(redirect).await;
        assert_eq!(
            orch.host().surface(game).unwrap().url,
            Some(format!("https://localhost:{}/0/?code=abc", port))
        );

        orch.shutdown().await;
    }
}

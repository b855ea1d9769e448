//! Mirror Launcher - Main Entry Point
//!
//! Parses the CLI, loads configuration, and runs the orchestrator against a
//! headless surface host. Control messages are read from stdin as one JSON
//! value per line; each reply is written to stdout as JSON.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mirror_launcher::{
    config::{CliArgs, LauncherSettings},
    orchestrator::{
        event_channel, ControlChannel, ControlMessage, ControlProcessor, ControlResponse,
        EventEnvelope, Orchestrator,
    },
    surface::{MockSurfaceHost, SurfaceEvent},
    NAME, VERSION,
};

/// ANSI color codes for terminal output
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
}

/// Print the startup banner with version
fn print_banner() {
    eprintln!(
        r#"
{cyan}{bold}  __  __ _                        _                           _
 |  \/  (_)_ __ _ __ ___  _ __   | |    __ _ _   _ _ __   ___| |__   ___ _ __
 | |\/| | | '__| '__/ _ \| '__|  | |   / _` | | | | '_ \ / __| '_ \ / _ \ '__|
 | |  | | | |  | | | (_) | |     | |__| (_| | |_| | | | | (__| | | |  __/ |
 |_|  |_|_|_|  |_|  \___/|_|     |_____\__,_|\__,_|_| |_|\___|_| |_|\___|_|
{reset}
{dim}  Local HTTPS mirror with script injection{reset}
{dim}  Version: {version}{reset}
"#,
        cyan = colors::CYAN,
        bold = colors::BOLD,
        reset = colors::RESET,
        dim = colors::DIM,
        version = VERSION
    );
}

/// Print configuration summary
fn print_config_summary(settings: &LauncherSettings) {
    eprintln!(
        "{bold}{blue}Configuration:{reset}",
        bold = colors::BOLD,
        blue = colors::BLUE,
        reset = colors::RESET
    );
    eprintln!(
        "  {dim}Mirror:{reset}          {}:{}",
        settings.bind_host,
        settings.server_port,
        dim = colors::DIM,
        reset = colors::RESET
    );
    eprintln!(
        "  {dim}Remote:{reset}          {}",
        settings.remote_domain,
        dim = colors::DIM,
        reset = colors::RESET
    );
    eprintln!(
        "  {dim}Scripts:{reset}         {}",
        settings.scripts_dir.display(),
        dim = colors::DIM,
        reset = colors::RESET
    );
    eprintln!(
        "  {dim}Certificate:{reset}     {}",
        settings.cert_path.display(),
        dim = colors::DIM,
        reset = colors::RESET
    );
    eprintln!(
        "  {dim}Readiness:{reset}       window.{}{}",
        settings.readiness_global,
        settings
            .gate_max_frames
            .map(|frames| format!(" (give up after {} frames)", frames))
            .unwrap_or_default(),
        dim = colors::DIM,
        reset = colors::RESET
    );
    eprintln!(
        "  {dim}Cert Policy:{reset}     {yellow}{}{reset}",
        settings.certificate_policy,
        dim = colors::DIM,
        yellow = colors::YELLOW,
        reset = colors::RESET
    );
    eprintln!(
        "  {dim}Devtools:{reset}        {}",
        if settings.devtools {
            format!("{green}enabled{reset}", green = colors::GREEN, reset = colors::RESET)
        } else {
            format!("{yellow}disabled{reset}", yellow = colors::YELLOW, reset = colors::RESET)
        },
        dim = colors::DIM,
        reset = colors::RESET
    );
    eprintln!();
}

/// Build the CLI command parser
fn build_cli() -> Command {
    Command::new(NAME)
        .version(VERSION)
        .about("Local HTTPS mirror and script injection launcher for a web game")
        .long_about(
            "Mirror Launcher serves a local HTTPS mirror of a remote game and\n\
             keeps the game window pinned to it, injecting the scripts listed\n\
             in the active manifest on every page load.\n\n\
             Control messages are read from stdin, one JSON value per line:\n\
             [\"start-game\"] or [\"start-tool\", {\"filesDir\": \"...\"}]",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to configuration file (TOML or JSON)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Preferred mirror port (default: 8887)")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("remote-domain")
                .long("remote-domain")
                .value_name("URL")
                .help("Remote origin to mirror"),
        )
        .arg(
            Arg::new("scripts-dir")
                .long("scripts-dir")
                .value_name("DIR")
                .help("Directory containing active.json")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("cert")
                .long("cert")
                .value_name("FILE")
                .help("PEM certificate served by the mirror")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("key")
                .long("key")
                .value_name("FILE")
                .help("PEM private key for the certificate")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("devtools")
                .long("devtools")
                .help("Open developer tools for every surface")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("start-game")
                .long("start-game")
                .help("Start the game immediately instead of waiting for a control message")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Suppress output except errors")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose"),
        )
}

/// Parse CLI arguments into CliArgs struct
fn parse_cli_args(matches: &clap::ArgMatches) -> CliArgs {
    let mut args = CliArgs::default();

    args.config_file = matches.get_one::<PathBuf>("config").cloned();
    args.port = matches.get_one::<u16>("port").copied();
    args.remote_domain = matches.get_one::<String>("remote-domain").cloned();
    args.scripts_dir = matches.get_one::<PathBuf>("scripts-dir").cloned();
    args.cert_path = matches.get_one::<PathBuf>("cert").cloned();
    args.key_path = matches.get_one::<PathBuf>("key").cloned();

    if matches.get_flag("devtools") {
        args.devtools = Some(true);
    }

    args
}

/// Initialize the tracing/logging subsystem
fn init_tracing(verbosity: u8, quiet: bool) -> Result<()> {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbosity {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("tower_http=info".parse()?);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false),
        )
        .with(filter)
        .init();

    Ok(())
}

/// Route panics through tracing so they land in the same log as everything else
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        error!("Uncaught panic: {}", info);
    }));
}

/// Writes a control reply to stdout as one JSON line
fn write_response(response: &ControlResponse) {
    match serde_json::to_string(response) {
        Ok(line) => println!("{}", line),
        Err(e) => error!("Failed to encode control response: {}", e),
    }
}

/// Sends one control message and returns the reply.
///
/// The headless host never finishes loading on its own, so a load-finished
/// event is raised when a game surface is first opened. A reused game
/// surface has not reloaded and gets none.
async fn dispatch(
    channel: &ControlChannel,
    events: &mpsc::Sender<EventEnvelope>,
    message: ControlMessage,
) -> ControlResponse {
    let is_game = message == ControlMessage::StartGame;
    let response = channel
        .send(message)
        .await
        .unwrap_or_else(|e| ControlResponse::error(e.to_string()));
    if is_game && response.success && response.created {
        if let Some(surface) = response.surface {
            let _ = events.send((SurfaceEvent::DidFinishLoad { surface }, None)).await;
        }
    }
    response
}

/// Feeds control messages from stdin into the orchestrator.
async fn forward_control(
    channel: ControlChannel,
    events: mpsc::Sender<EventEnvelope>,
    start_game: bool,
) {
    if start_game {
        write_response(&dispatch(&channel, &events, ControlMessage::StartGame).await);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match ControlMessage::from_json(line) {
                    Ok(message) => write_response(&dispatch(&channel, &events, message).await),
                    Err(e) => {
                        error!("Rejected control message: {}", e);
                        write_response(&ControlResponse::error(e.to_string()));
                    }
                }
            }
            Ok(None) => {
                debug!("stdin closed");
                break;
            }
            Err(e) => {
                error!("Failed to read control input: {}", e);
                break;
            }
        }
    }
}

/// Main application entry point
#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let matches = build_cli().get_matches();

    // Get verbosity settings before loading config
    let verbosity = matches.get_count("verbose");
    let quiet = matches.get_flag("quiet");

    // Initialize logging
    init_tracing(verbosity, quiet)?;
    install_panic_hook();

    // Load configuration with full precedence chain
    let settings = parse_cli_args(&matches)
        .load_settings()
        .context("Failed to load configuration")?;

    // Print banner unless quiet mode
    if !quiet {
        print_banner();
        print_config_summary(&settings);
    }

    info!("Using headless surface host");
    let host = Arc::new(MockSurfaceHost::new());
    let mut orchestrator = Orchestrator::from_settings(host, settings)?;
    orchestrator.start().await?;

    let channel = ControlChannel::new();
    let processor = ControlProcessor::new(&channel)
        .await
        .context("Control receiver already taken")?;
    let (events_tx, events_rx) = event_channel(64);

    tokio::spawn(forward_control(
        channel,
        events_tx.clone(),
        matches.get_flag("start-game"),
    ));

    info!("Mirror Launcher is running. Press Ctrl+C to stop.");

    tokio::select! {
        result = orchestrator.run(processor, events_rx) => {
            if let Err(e) = result {
                error!("Orchestrator stopped with error: {:#}", e);
            }
        }
        signal = signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Received shutdown signal, stopping gracefully..."),
                Err(e) => error!("Failed to listen for shutdown signal: {}", e),
            }
        }
    }

    // Graceful shutdown
    orchestrator.shutdown().await;
    drop(events_tx);

    if !quiet {
        eprintln!(
            "{green}Mirror Launcher stopped.{reset}",
            green = colors::GREEN,
            reset = colors::RESET
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let matches = build_cli()
            .try_get_matches_from(["mirror-launcher", "--devtools", "--start-game"])
            .unwrap();

        assert!(matches.get_flag("devtools"));
        assert!(matches.get_flag("start-game"));
    }

    #[test]
    fn test_cli_port_parsing() {
        let matches = build_cli()
            .try_get_matches_from(["mirror-launcher", "--port", "9443"])
            .unwrap();

        assert_eq!(matches.get_one::<u16>("port"), Some(&9443));
    }

    #[test]
    fn test_cli_conflicts() {
        let result = build_cli().try_get_matches_from(["mirror-launcher", "-v", "--quiet"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_cli_args() {
        let matches = build_cli()
            .try_get_matches_from([
                "mirror-launcher",
                "--port",
                "9000",
                "--remote-domain",
                "https://game.example.com/",
                "--scripts-dir",
                "/opt/execute",
                "--cert",
                "c.crt",
                "--key",
                "k.pem",
            ])
            .unwrap();

        let args = parse_cli_args(&matches);

        assert_eq!(args.port, Some(9000));
        assert_eq!(args.remote_domain.as_deref(), Some("https://game.example.com/"));
        assert_eq!(args.scripts_dir, Some(PathBuf::from("/opt/execute")));
        assert_eq!(args.cert_path, Some(PathBuf::from("c.crt")));
        assert_eq!(args.key_path, Some(PathBuf::from("k.pem")));
        assert_eq!(args.devtools, None);
    }

    #[tokio::test]
    async fn test_repeated_start_game_injects_once() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("hud")).unwrap();
        std::fs::write(dir.path().join("hud/script.js"), "hud()").unwrap();
        std::fs::write(
            dir.path().join(mirror_launcher::injection::MANIFEST_FILE),
            r#"[{"name": "hud", "filesDir": "hud", "sync": true}]"#,
        )
        .unwrap();

        let certs = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("certificate");
        let settings = LauncherSettings::default()
            .with_server_port(0)
            .with_scripts_dir(dir.path())
            .with_user_config_path(dir.path().join("configs-user.json"))
            .with_certificate(certs.join("cert.crt"), certs.join("key.pem"));
        let host = Arc::new(MockSurfaceHost::new());
        let mut orchestrator = Orchestrator::from_settings(host.clone(), settings).unwrap();
        orchestrator.start().await.unwrap();

        let channel = ControlChannel::new();
        let processor = ControlProcessor::new(&channel).await.unwrap();
        let (events_tx, events_rx) = event_channel(16);

        let driver = async move {
            let first = dispatch(&channel, &events_tx, ControlMessage::StartGame).await;
            let second = dispatch(&channel, &events_tx, ControlMessage::StartGame).await;
            let game = first.surface.unwrap();
            assert!(first.created);
            assert!(!second.created);
            assert_eq!(second.surface, Some(game));

            events_tx
                .send((SurfaceEvent::Closed { surface: game }, None))
                .await
                .unwrap();
            game
        };

        let result = tokio::time::timeout(std::time::Duration::from_secs(10), async {
            tokio::join!(orchestrator.run(processor, events_rx), driver)
        })
        .await;
        let (run_result, game) = match result {
            Ok(value) => value,
            Err(_) => panic!("event loop did not finish"),
        };

        run_result.unwrap();
        assert_eq!(host.executed(game), vec!["hud"]);
    }
}

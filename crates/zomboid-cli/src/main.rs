//! pz-update-monitor: keeps a Project Zomboid dedicated server current
//!
//! Usage: `pz-update-monitor [run|probe] [CONFIG]`
//!
//! - `run` (default) polls for game and workshop updates and restarts the
//!   server, warning connected players first
//! - `probe` checks RCON connectivity and prints what the server answers
//!
//! CONFIG defaults to `pz_monitor.toml`. Log verbosity follows `RUST_LOG`.

use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zomboid_core::Settings;
use zomboid_core::settings::PASSWORD_ENV;
use zomboid_monitor::{
    Monitor, RemoteConsole, RestartScheduler, ServerLogSink, SteamSource, SystemctlRestarter,
    UpdateDetector, VersionStore,
};
use zomboid_rcon::{RconClient, RconConfig};

const DEFAULT_CONFIG: &str = "pz_monitor.toml";

/// Commands sent by `probe`
const PROBE_COMMANDS: [&str; 2] = ["players", "help"];

enum Mode {
    Run,
    Probe,
}

fn parse_args() -> Result<(Mode, PathBuf)> {
    let mut mode = Mode::Run;
    let mut config = PathBuf::from(DEFAULT_CONFIG);

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "run" => mode = Mode::Run,
            "probe" => mode = Mode::Probe,
            "-h" | "--help" => {
                eprintln!("usage: pz-update-monitor [run|probe] [CONFIG]");
                std::process::exit(0);
            }
            flag if flag.starts_with('-') => bail!("unknown option {}", flag),
            path => config = PathBuf::from(path),
        }
    }

    Ok((mode, config))
}

fn rcon_client(settings: &Settings) -> RconClient {
    let server = &settings.server;
    RconClient::new(RconConfig {
        connect_timeout: Duration::from_secs(server.timeout_secs),
        first_read_timeout: Duration::from_secs(server.timeout_secs),
        ..RconConfig::new(server.rcon_address(), server.rcon_password.clone())
    })
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM from systemd
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutdown requested");
}

async fn run(settings: Settings) -> Result<()> {
    let console: Arc<dyn RemoteConsole> = Arc::new(rcon_client(&settings));

    let store = VersionStore::open(&settings.monitor.database_path).with_context(|| {
        format!(
            "opening version database {}",
            settings.monitor.database_path.display()
        )
    })?;
    let source = SteamSource::new(Duration::from_secs(settings.steam.timeout_secs))?;
    let sink = ServerLogSink::new(settings.logs.clone(), settings.server.service_name.clone());
    let restarter = SystemctlRestarter::from_settings(&settings.server);

    let detector = UpdateDetector::new(
        store,
        Arc::new(source),
        console.clone(),
        Arc::new(sink),
        settings.steam.clone(),
        Duration::from_secs(settings.logs.settle_secs),
    );
    let scheduler = RestartScheduler::new(console.clone(), Arc::new(restarter), settings.restart);
    let monitor = Monitor::new(detector, scheduler, console, settings.monitor);

    monitor.run(shutdown_signal()).await?;
    Ok(())
}

/// Send each diagnostic command and log its reply. Fails when none of
/// them got an answer.
async fn check_commands(console: &dyn RemoteConsole) -> Result<()> {
    let mut answered = 0;
    for command in PROBE_COMMANDS {
        match console.send_command(command).await {
            Ok(reply) => {
                info!("{} -> {}", command, reply.trim_end());
                answered += 1;
            }
            Err(e) => warn!("{} failed: {}", command, e),
        }
    }

    if answered == 0 {
        bail!("authenticated, but no command returned a reply");
    }
    Ok(())
}

async fn probe(settings: Settings) -> Result<()> {
    let client = rcon_client(&settings);

    info!("Connecting to {}", client.address());
    if let Err(e) = client.connect().await {
        error!("RCON connection failed: {}", e);
        error!("Troubleshooting:");
        error!("  1. Is the server running? (systemctl status {})", settings.server.service_name);
        error!("  2. RCONPort in the server ini must match {}", settings.server.rcon_port);
        error!("  3. RCONPassword must match server.rcon_password or {}", PASSWORD_ENV);
        error!("  4. Is port {} open on the server's firewall?", settings.server.rcon_port);
        bail!("RCON probe failed");
    }
    info!("Authenticated");

    let result = check_commands(&client).await;
    client.close().await;
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let (mode, path) = parse_args()?;
    let settings = Settings::load(&path)
        .with_context(|| format!("loading settings from {}", path.display()))?;
    settings.validate()?;

    match mode {
        Mode::Run => run(settings).await,
        Mode::Probe => probe(settings).await,
    }
}

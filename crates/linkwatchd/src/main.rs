// # linkwatchd - Connectivity Monitoring Daemon
//
// Thin integration layer: all monitoring logic lives in linkwatch-core.
// The daemon is responsible for:
// 1. Locating the configuration file and state directory
// 2. Initializing tracing and the runtime
// 3. Wiring the prober, lookup providers and notification sink
// 4. Running the engine until SIGTERM/SIGINT
//
// ## Configuration
//
// The monitoring configuration itself is a TOML file (hot-reloaded by the
// engine); the daemon only needs to find it. Environment variables:
//
// - `LINKWATCH_CONFIG`: path to the TOML config
//   (default: $HOME/.config/linkwatch/config.toml)
// - `LINKWATCH_STATE_DIR`: state directory written for readers
//   (default: $HOME/.local/state/linkwatch)
// - `LINKWATCH_LOG_LEVEL`: trace|debug|info|warn|error (default: info)
//
// ## Example
//
// ```bash
// export LINKWATCH_CONFIG=/etc/linkwatch/config.toml
// export LINKWATCH_STATE_DIR=/var/lib/linkwatch
//
// linkwatchd
// ```

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

use linkwatch_core::{ConfigStore, IpTracker, MonitorEngine, MonitorEvent, StatePublisher, SystemClock};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

mod sink;

/// Exit codes for different termination scenarios
///
/// These codes follow daemon conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DaemonExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Startup failure (state directory, pid file, raw sockets)
    StartupError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DaemonExitCode> for ExitCode {
    fn from(code: DaemonExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Paths and logging resolved from the environment
struct DaemonPaths {
    config: PathBuf,
    state_dir: PathBuf,
    log_level: String,
}

impl DaemonPaths {
    fn from_env() -> Self {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Self {
            config: env::var("LINKWATCH_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    PathBuf::from(&home).join(".config/linkwatch/config.toml")
                }),
            state_dir: env::var("LINKWATCH_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(&home).join(".local/state/linkwatch")),
            log_level: env::var("LINKWATCH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

fn main() -> ExitCode {
    let paths = DaemonPaths::from_env();

    let log_level = match paths.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => {
            eprintln!("unknown LINKWATCH_LOG_LEVEL {other:?}, using info");
            Level::INFO
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to set tracing subscriber: {e}");
        return DaemonExitCode::StartupError.into();
    }

    info!("starting linkwatchd");
    info!("config file: {}", paths.config.display());
    info!("state directory: {}", paths.state_dir.display());

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to create tokio runtime: {e}");
            return DaemonExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run_daemon(paths).await {
            Ok(()) => DaemonExitCode::CleanShutdown,
            Err(e) => {
                error!("daemon error: {e}");
                if e.downcast_ref::<linkwatch_core::Error>()
                    .is_some_and(linkwatch_core::Error::is_fatal)
                {
                    DaemonExitCode::StartupError
                } else {
                    DaemonExitCode::RuntimeError
                }
            }
        }
    })
    .into()
}

/// Wire the components and run the engine
async fn run_daemon(paths: DaemonPaths) -> Result<()> {
    let mut config_store = ConfigStore::new(&paths.config);
    config_store.load();

    let clock = Arc::new(SystemClock);

    let prober = Box::new(linkwatch_probe_icmp::IcmpProber::new()?);
    let tracker = IpTracker::new(
        linkwatch_ip_http::default_ip_chain(),
        linkwatch_ip_http::default_geo_chain(),
        clock.clone(),
    );
    let publisher = StatePublisher::new(&paths.state_dir);
    let sink = Arc::new(sink::LogNotificationSink);

    let (mut engine, event_rx) = MonitorEngine::new(
        config_store,
        prober,
        tracker,
        sink,
        publisher,
        clock,
    );

    engine.startup().await?;

    // Best-effort observer; the engine never blocks on it
    tokio::spawn(drain_events(event_rx));

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let signal_name = wait_for_shutdown().await;
        info!("received {signal_name}, shutting down");
        let _ = shutdown_tx.send(());
    });

    engine.run_with_shutdown(shutdown_rx).await?;
    info!("linkwatchd stopped");
    Ok(())
}

/// Log engine events as they stream out
async fn drain_events(event_rx: tokio::sync::mpsc::Receiver<MonitorEvent>) {
    let mut events = ReceiverStream::new(event_rx);
    while let Some(event) = events.next().await {
        match &event {
            MonitorEvent::OutageStarted { .. }
            | MonitorEvent::Restored { .. }
            | MonitorEvent::IpChanged { .. } => info!("engine event: {event:?}"),
            _ => debug!("engine event: {event:?}"),
        }
    }
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() -> &'static str {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("failed to set up SIGTERM handler: {e}");
            // Fall back to SIGINT only
            let _ = tokio::signal::ctrl_c().await;
            return "SIGINT";
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!("failed to set up SIGINT handler: {e}");
            sigterm.recv().await;
            return "SIGTERM";
        }
    };

    tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    }
}

/// SIGINT only on non-unix platforms
#[cfg(not(unix))]
async fn wait_for_shutdown() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "SIGINT"
}

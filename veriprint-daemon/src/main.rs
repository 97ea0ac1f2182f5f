//! veriprintd - fingerprint enrollment and verification daemon.
//!
//! Bridges a fingerprint sensor to a desktop authentication framework:
//! callers invoke enroll/verify/cancel over a Unix socket and receive
//! asynchronous progress signals. Startup order matters: the restart
//! rate limiter runs before any hardware access so a crash loop is
//! throttled at the cheapest possible point.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::UnixListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use veriprint_daemon::config::Config;
use veriprint_daemon::identity::{IdentityResolver, SystemAccounts};
use veriprint_daemon::ipc;
use veriprint_daemon::ratelimit;
use veriprint_daemon::registrar::{run_registrar, RegisterDevice};
use veriprint_daemon::service::DeviceService;
use veriprint_daemon::sessions::SessionManager;
use veriprint_daemon::signals::SignalHub;
use veriprint_sensor::{DeviceSelector, SensorDriver, SensorError, UserStore};

/// Restart-log file name inside the state directory.
const RESTART_LOG: &str = "restart.log";

/// Daemon socket file name inside the runtime directory.
const SOCKET_NAME: &str = "veriprintd.sock";

/// Well-known manager socket name inside the runtime directory.
const MANAGER_SOCKET: &str = "manager.sock";

/// Fingerprint enrollment and verification daemon.
#[derive(Parser, Debug)]
#[command(name = "veriprintd", version, about)]
struct Cli {
    /// Raise verbosity and enable low-level tracing
    #[arg(long)]
    debug: bool,

    /// Select a specific sensor, `usb-<bus>-<address>`
    #[arg(long, value_name = "SELECTOR")]
    device: Option<DeviceSelector>,

    /// Configuration directory
    #[arg(long, value_name = "PATH", default_value = "/etc/veriprint")]
    config_dir: PathBuf,

    /// State directory holding the restart log
    #[arg(long, value_name = "PATH", default_value = "/var/lib/veriprint")]
    state_dir: PathBuf,

    /// Runtime directory for the daemon and manager sockets
    #[arg(long, value_name = "PATH", default_value = "/run/veriprint")]
    runtime_dir: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    run(cli).await
}

async fn run(cli: Cli) -> ExitCode {
    let config = match Config::load(&cli.config_dir) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "configuration error");
            return ExitCode::FAILURE;
        }
    };
    let overrides = match config.parsed_overrides() {
        Ok(overrides) => overrides,
        Err(e) => {
            tracing::error!(error = %e, "configuration error");
            return ExitCode::FAILURE;
        }
    };

    // Throttle crash-restart storms before touching the hardware.
    let now = chrono::Utc::now().timestamp_micros() as f64 / 1e6;
    match ratelimit::record_start(&cli.state_dir.join(RESTART_LOG), now) {
        Ok(count) => tracing::info!(starts_in_window = count, "restart budget ok"),
        Err(e) => {
            tracing::error!(error = %e, "refusing to start");
            return ExitCode::FAILURE;
        }
    }

    let selector = cli.device.unwrap_or_default();
    let sensor = match veriprint_sensor::open(&selector) {
        Ok(sensor) => Arc::new(sensor),
        Err(SensorError::RebootNeeded) => {
            // Clean exit: the service manager restarts us once the
            // sensor has rebooted.
            tracing::warn!("sensor requires a reboot, exiting");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            tracing::error!(error = %e, device = %selector, "failed to open sensor");
            return ExitCode::FAILURE;
        }
    };
    let driver: Arc<dyn SensorDriver> = sensor.clone();
    let store: Arc<dyn UserStore> = sensor;

    let resolver = Arc::new(IdentityResolver::new(
        Box::new(SystemAccounts),
        overrides,
        store.clone(),
    ));
    let hub = SignalHub::new();
    let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel();
    let sessions = SessionManager::new(driver.clone(), resolver.clone(), hub.clone(), fatal_tx);
    let service = Arc::new(DeviceService::new(driver, store, resolver, sessions));

    if let Err(e) = std::fs::create_dir_all(&cli.runtime_dir) {
        tracing::error!(error = %e, dir = %cli.runtime_dir.display(), "cannot create runtime dir");
        return ExitCode::FAILURE;
    }
    let socket_path = cli.runtime_dir.join(SOCKET_NAME);
    let _ = std::fs::remove_file(&socket_path);
    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, socket = %socket_path.display(), "cannot bind socket");
            return ExitCode::FAILURE;
        }
    };

    let announcement = RegisterDevice::new(
        socket_path.display().to_string(),
        selector.to_string(),
    );
    let registrar = tokio::spawn(run_registrar(
        cli.runtime_dir.join(MANAGER_SOCKET),
        announcement,
    ));

    tracing::info!(socket = %socket_path.display(), device = %selector, "veriprintd ready");
    let mut serve_task = tokio::spawn(ipc::serve(listener, service, hub));

    let code = tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
            ExitCode::SUCCESS
        }
        Some(reason) = fatal_rx.recv() => {
            tracing::error!(reason = %reason, "fatal hardware failure, stopping");
            ExitCode::FAILURE
        }
        result = &mut serve_task => {
            match result {
                Ok(Err(e)) => tracing::error!(error = %e, "accept loop failed"),
                Ok(Ok(())) => tracing::error!("accept loop ended unexpectedly"),
                Err(e) => tracing::error!(error = %e, "accept loop panicked"),
            }
            ExitCode::FAILURE
        }
    };

    registrar.abort();
    serve_task.abort();
    let _ = std::fs::remove_file(&socket_path);
    code
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            tracing::warn!(error = %e, "cannot install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

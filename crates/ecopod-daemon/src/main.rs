//! Ecopod Daemon - unattended field recorder service
//!
//! This binary runs as a systemd service on the pod and handles:
//! - Boot-mode determination and storage preparation
//! - The capture worker (perpetual sense-and-store loop)
//! - The sync worker (interval-paced uploads, modem duty-cycling)
//! - Graceful shutdown on SIGTERM/SIGINT
//! - Watchdog escalation for everything the workers cannot contain
//!
//! # Architecture
//!
//! The daemon wires the hardware adapters into the orchestration engine,
//! runs the boot sequencer, then spawns the two workers and waits. The
//! workers are controlled by a `CancellationToken` that is triggered on
//! receipt of SIGTERM or SIGINT; any failure that escapes a worker lands
//! in the watchdog, which blinks distress and reboots.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ecopod_core::config::Config;
use ecopod_core::domain::reboot::RebootPolicy;
use ecopod_core::ports::indicator::{IIndicator, LedState, StatusGroup};
use ecopod_core::ports::remote_store::IRemoteStore;
use ecopod_core::ports::system::ISystemControl;
use ecopod_engine::boot::{BootSequencer, BootSettings};
use ecopod_engine::capture::CaptureSupervisor;
use ecopod_engine::connectivity::{ConnectivityController, ConnectivitySettings};
use ecopod_engine::sync::SyncSupervisor;
use ecopod_engine::watchdog::Watchdog;
use ecopod_gcs::{GcsClient, ServiceAccountKey};
use ecopod_hal::{GpioModemControl, LinuxSystemControl, Pcf8574Indicator, SdCardStorage};

mod logging;

/// Watchdog recovery window used before any configuration is available
const PRE_BOOT_RECOVERY: Duration = Duration::from_secs(300);

/// Fallback for an invalid configured reboot hour
const DEFAULT_REBOOT_HOUR_UTC: u32 = 2;

// ============================================================================
// T201: worker supervision helpers
// ============================================================================

/// Maps a finished worker join result to an escalatable failure.
fn worker_failure(name: &str, result: Result<Result<()>, JoinError>) -> Option<anyhow::Error> {
    match result {
        Ok(Ok(())) => {
            info!(worker = name, "Worker stopped");
            None
        }
        Ok(Err(e)) => Some(e.context(format!("{name} worker failed"))),
        Err(join_error) => Some(anyhow::anyhow!("{name} worker panicked: {join_error}")),
    }
}

/// Builds the remote store from the device configuration.
fn build_store(config: &Config, config_path: &std::path::Path) -> Result<Arc<dyn IRemoteStore>> {
    if config.device.gcs_bucket_name.is_empty() {
        anyhow::bail!("No gcs_bucket_name configured");
    }

    // In the field the config file doubles as the service-account key
    // file unless a separate one is configured.
    let key_path = config
        .device
        .credentials_file
        .clone()
        .unwrap_or_else(|| config_path.to_path_buf());
    let key = ServiceAccountKey::from_file(&key_path)?;

    Ok(Arc::new(GcsClient::new(
        config.device.gcs_bucket_name.clone(),
        key,
    )))
}

// ============================================================================
// T202: graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// T203: main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::var("ECOPOD_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.json"));
    let log_dir = std::env::var("ECOPOD_LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("logs"));

    // The authoritative (fatal) identity check happens in the boot
    // sequencer; the label here only names the log file.
    let system: Arc<dyn ISystemControl> = Arc::new(LinuxSystemControl::new());
    let device_label = system
        .device_id()
        .map(|id| id.to_string())
        .unwrap_or_else(|_| "unidentified".to_string());

    let (_log_guard, log_file) = logging::init(&log_dir, &device_label)?;
    info!(device = %device_label, log_file = %log_file, "ecopodd starting");

    let indicator: Arc<dyn IIndicator> = Arc::new(Pcf8574Indicator::new());
    indicator.set_state(StatusGroup::Power, LedState::ON);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    // Claim the modem lines. Without them the pod cannot manage its power
    // budget; that is a hardware fault, so it goes to the watchdog like
    // any other unrecoverable failure.
    let modem = match GpioModemControl::new().await {
        Ok(modem) => Arc::new(modem),
        Err(e) => {
            let watchdog = Watchdog::new(
                Arc::clone(&indicator),
                Arc::clone(&system),
                Some(PRE_BOOT_RECOVERY),
            );
            watchdog.engage(e).await;
            return Ok(());
        }
    };

    let connectivity = ConnectivityController::new(
        Arc::clone(&modem) as _,
        Arc::clone(&system),
        Arc::clone(&indicator),
        ConnectivitySettings::default(),
    );

    let boot_settings = BootSettings {
        local_config_path: config_path.clone(),
        log_dir,
        current_log_file: Some(log_file),
        ..BootSettings::default()
    };
    let sequencer = BootSequencer::new(
        Arc::clone(&system),
        Arc::new(SdCardStorage::new()),
        Arc::clone(&modem) as _,
        Arc::clone(&indicator),
        boot_settings,
    );

    let outcome = match sequencer
        .run(&connectivity, |sensor_config| {
            ecopod_capture::build_sensor(sensor_config).map_err(Into::into)
        })
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = format!("{e:#}"), "Boot failed");
            let watchdog = Watchdog::new(
                Arc::clone(&indicator),
                Arc::clone(&system),
                Some(PRE_BOOT_RECOVERY),
            );
            watchdog.engage(e.into()).await;
            return Ok(());
        }
    };

    info!(
        device = %outcome.device_id,
        mode = %outcome.mode,
        upload_dir = %outcome.layout.upload_dir.display(),
        "Boot complete"
    );

    let recovery = outcome
        .config
        .schedule
        .error_recovery_secs
        .map(Duration::from_secs);
    let watchdog = Watchdog::new(Arc::clone(&indicator), Arc::clone(&system), recovery);

    let reboot_policy = match RebootPolicy::new(outcome.config.schedule.reboot_hour_utc) {
        Ok(policy) => policy,
        Err(e) => {
            warn!(error = %e, "Invalid reboot hour; using default");
            RebootPolicy::new(DEFAULT_REBOOT_HOUR_UTC)?
        }
    };

    // Capture worker.
    let capture = CaptureSupervisor::new(
        Arc::clone(&outcome.sensor),
        Arc::clone(&indicator),
        Arc::clone(&system),
        Arc::clone(&outcome.runtime),
        outcome.layout.clone(),
        reboot_policy,
        shutdown.clone(),
    );
    info!("Starting continuous recording");
    let mut capture_handle: JoinHandle<Result<()>> = tokio::spawn(capture.run());

    // Sync worker: the connectivity controller moves in here, making the
    // sync supervisor the only modem driver for the rest of the run.
    let mut sync_handle: Option<JoinHandle<Result<()>>> = if outcome.mode.sync_enabled() {
        match build_store(&outcome.config, &config_path) {
            Ok(store) => {
                let interval = outcome.sensor.sync_interval();
                info!(
                    interval_secs = interval.as_secs(),
                    bucket = %outcome.config.device.gcs_bucket_name,
                    "Starting cloud synchronisation"
                );
                let sync = SyncSupervisor::new(
                    store,
                    connectivity,
                    Arc::clone(&indicator),
                    Arc::clone(&outcome.runtime),
                    outcome.layout.upload_dir.clone(),
                    interval,
                    outcome.config.schedule.boot_connect_retries,
                    shutdown.clone(),
                );
                Some(tokio::spawn(sync.run()))
            }
            Err(e) => {
                error!(
                    error = format!("{e:#}"),
                    "Cannot build upload client; continuing capture-only"
                );
                None
            }
        }
    } else {
        info!("Offline mode - no cloud synchronisation");
        None
    };

    // Supervise: first worker failure wins; otherwise wait for shutdown.
    let mut capture_finished = false;
    let mut sync_finished = false;
    let failure = tokio::select! {
        result = &mut capture_handle => {
            capture_finished = true;
            worker_failure("capture", result)
        }
        result = async {
            match sync_handle.as_mut() {
                Some(handle) => handle.await,
                None => std::future::pending().await,
            }
        } => {
            sync_finished = true;
            worker_failure("sync", result)
        }
        _ = shutdown.cancelled() => {
            info!("Shutdown requested; waiting for workers to finish their cycles");
            None
        }
    };

    if let Some(error) = failure {
        watchdog.engage(error).await;
        return Ok(());
    }

    // Cooperative shutdown: both workers run their current cycle to
    // completion, never killed mid-upload or mid-recording.
    if !capture_finished {
        if let Some(error) = worker_failure("capture", capture_handle.await) {
            error!(error = format!("{error:#}"), "Capture worker failed during shutdown");
        }
    }
    if let Some(handle) = sync_handle {
        if !sync_finished {
            if let Some(error) = worker_failure("sync", handle.await) {
                error!(error = format!("{error:#}"), "Sync worker failed during shutdown");
            }
        }
    }

    info!("Recording and sync shut down; exiting");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

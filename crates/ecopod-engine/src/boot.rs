//! Boot sequencer
//!
//! Ordered boot protocol: discover identity, probe the modem, mount and
//! verify removable storage, install/fall back configuration, resolve the
//! device mode, prepare the directory tree, construct the sensor. Each
//! step's failure is either fatal (identity, configuration-with-nothing-
//! to-fall-back-to, storage preparation, sensor construction) or demotes
//! the device into a degraded mode candidate.
//!
//! The asymmetry around configuration is deliberate and load-bearing: a
//! missing or unreadable config is survivable only when removable storage
//! mounted (the pod runs as an offline recorder saving to the card); with
//! no card either, there is nothing to recover to and boot aborts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use thiserror::Error;
use tracing::{debug, info, warn};

use ecopod_core::config::{Config, SensorConfig};
use ecopod_core::domain::layout::{DirectoryLayout, StorageIdentity};
use ecopod_core::domain::mode::DeviceMode;
use ecopod_core::domain::newtypes::{ConfigId, DeviceId, ProjectId};
use ecopod_core::domain::runtime::DeviceRuntimeState;
use ecopod_core::ports::capture::ICaptureSensor;
use ecopod_core::ports::indicator::{IIndicator, LedState, StatusGroup};
use ecopod_core::ports::modem::IModemControl;
use ecopod_core::ports::removable_storage::IRemovableStorage;
use ecopod_core::ports::system::ISystemControl;

use crate::connectivity::ConnectivityController;
use crate::storage;

// ============================================================================
// T141: BootError
// ============================================================================

/// Fatal boot failures, escalated straight to the watchdog
#[derive(Debug, Error)]
pub enum BootError {
    /// No unique device identity - directory naming depends on it
    #[error("could not discover device identity")]
    Identity(#[source] anyhow::Error),

    /// No usable configuration and no removable storage to fall back to
    #[error("no usable configuration and no removable storage")]
    NoConfiguration(#[source] anyhow::Error),

    /// The directory tree could not be brought to its canonical state
    #[error("failed to prepare storage directories")]
    StoragePreparation(#[source] anyhow::Error),

    /// The capture capability could not be constructed or set up
    #[error("capture sensor initialisation failed")]
    Sensor(#[source] anyhow::Error),
}

// ============================================================================
// T142: BootSettings / BootOutcome
// ============================================================================

/// Fixed paths and names the boot protocol works with.
///
/// These are deployment constants, not configuration: they must hold
/// before any configuration has been loaded.
#[derive(Debug, Clone)]
pub struct BootSettings {
    /// Where the locally persisted configuration lives
    pub local_config_path: PathBuf,
    /// File name of the configuration on the removable card
    pub config_file_name: String,
    /// Storage root used when no removable card is available
    pub local_root: PathBuf,
    /// Root for scratch space (survives nothing, typically tmpfs)
    pub working_root: PathBuf,
    /// Name of the sync tree under the storage root
    pub upload_dir_name: String,
    /// Directory holding per-run log files
    pub log_dir: PathBuf,
    /// Log file of the current run, excluded from staging
    pub current_log_file: Option<String>,
}

impl Default for BootSettings {
    fn default() -> Self {
        Self {
            local_config_path: PathBuf::from("config.json"),
            config_file_name: "config.json".to_string(),
            local_root: PathBuf::from("."),
            working_root: PathBuf::from("/tmp"),
            upload_dir_name: "captures".to_string(),
            log_dir: PathBuf::from("logs"),
            current_log_file: None,
        }
    }
}

/// Everything the daemon needs to start the workers
pub struct BootOutcome {
    pub device_id: DeviceId,
    pub mode: DeviceMode,
    pub layout: DirectoryLayout,
    pub config: Config,
    pub sensor: Arc<dyn ICaptureSensor>,
    pub runtime: Arc<DeviceRuntimeState>,
}

// ============================================================================
// T143: BootSequencer
// ============================================================================

/// Executes the boot protocol against the injected ports
pub struct BootSequencer {
    system: Arc<dyn ISystemControl>,
    storage_device: Arc<dyn IRemovableStorage>,
    modem: Arc<dyn IModemControl>,
    indicator: Arc<dyn IIndicator>,
    settings: BootSettings,
}

impl BootSequencer {
    pub fn new(
        system: Arc<dyn ISystemControl>,
        storage_device: Arc<dyn IRemovableStorage>,
        modem: Arc<dyn IModemControl>,
        indicator: Arc<dyn IIndicator>,
        settings: BootSettings,
    ) -> Self {
        Self {
            system,
            storage_device,
            modem,
            indicator,
            settings,
        }
    }

    /// Runs the full boot protocol.
    ///
    /// The connectivity controller is borrowed for the boot-time probe
    /// only; the caller hands it to the sync supervisor afterwards, which
    /// keeps a single modem driver per run. `build_sensor` injects the
    /// sensor registry so this crate stays free of sensor implementations.
    pub async fn run<F>(
        &self,
        connectivity: &ConnectivityController,
        build_sensor: F,
    ) -> Result<BootOutcome, BootError>
    where
        F: FnOnce(&SensorConfig) -> anyhow::Result<Arc<dyn ICaptureSensor>>,
    {
        // Step 1: identity. Nothing works without it.
        let device_id = self.system.device_id().map_err(BootError::Identity)?;
        info!(device = %device_id, "Boot sequence started");
        self.indicator.set_state(StatusGroup::Data, LedState::SETUP);

        // Step 2: modem power and enumeration. A pod without a modem is
        // an offline recorder, not a failure.
        let modem_present = connectivity.power_on_and_enumerate().await;
        let mut offline_candidate = !modem_present;

        // Step 3: removable storage.
        let storage_root = match self.mount_and_verify().await {
            Ok(root) => Some(root),
            Err(e) => {
                warn!(error = format!("{e:#}"), "Removable storage unavailable");
                None
            }
        };
        let no_storage_candidate = storage_root.is_none();

        // Step 4: configuration, preferring the card's copy.
        let mut newly_installed = false;
        if let Some(root) = &storage_root {
            match self.install_config_from_card(root).await {
                Ok(installed) => newly_installed = installed,
                Err(e) => {
                    info!(error = format!("{e:#}"), "No usable configuration on card")
                }
            }
        }

        let config = match Config::load(&self.settings.local_config_path) {
            Ok(config) => {
                for issue in config.validate() {
                    warn!(field = %issue.field, message = %issue.message, "Configuration issue");
                }
                config
            }
            Err(e) => {
                if no_storage_candidate {
                    // Nothing to record to and nothing to recover to.
                    return Err(BootError::NoConfiguration(e));
                }
                info!("No configuration anywhere; running as offline recorder to card");
                offline_candidate = true;
                Config::fallback()
            }
        };

        if newly_installed {
            if let Some(profile) = &config.mobile_network {
                if let Err(e) = self.modem.configure_apn(profile).await {
                    warn!(error = format!("{e:#}"), "Could not install mobile network profile");
                }
            }
        }

        // Step 5: resolve the mode.
        let mode = DeviceMode::resolve(offline_candidate, no_storage_candidate);
        let runtime = Arc::new(DeviceRuntimeState::new(mode));
        info!(mode = %mode, "Device mode resolved");

        // Step 6: reachability (online modes only).
        if mode == DeviceMode::Offline {
            self.indicator.set_state(StatusGroup::Data, LedState::OFFLINE);
        } else {
            let reachable = connectivity
                .wait_for_reachability(config.schedule.boot_connect_retries)
                .await;
            runtime.set_connected(reachable);
            if reachable {
                if let Err(e) = self.system.sync_clock().await {
                    warn!(error = format!("{e:#}"), "Clock synchronisation failed");
                }
            }
        }

        // Step 7: storage preparation.
        let layout = self
            .prepare_directories(&device_id, &config, storage_root.as_deref())
            .await?;

        // Step 8: the sensor itself.
        let sensor = build_sensor(&config.sensor).map_err(BootError::Sensor)?;
        sensor
            .setup()
            .await
            .context("Sensor setup failed")
            .map_err(BootError::Sensor)?;
        info!("Sensor setup succeeded");

        Ok(BootOutcome {
            device_id,
            mode,
            layout,
            config,
            sensor,
            runtime,
        })
    }

    // ========================================================================
    // T144: storage mount + verification
    // ========================================================================

    async fn mount_and_verify(&self) -> anyhow::Result<PathBuf> {
        let root = self
            .storage_device
            .mount()
            .await
            .context("Mounting removable storage failed")?;
        self.storage_device
            .verify_writable(&root)
            .await
            .context("Removable storage failed the write probe")?;
        info!(root = %root.display(), "Removable storage mounted and verified");
        Ok(root)
    }

    // ========================================================================
    // T145: configuration install
    // ========================================================================

    /// Copies the card's config over the local one if it differs.
    ///
    /// The card copy is validated as JSON before anything is overwritten;
    /// a corrupt file on the card must not destroy a working local config.
    /// Returns whether a new configuration was installed.
    async fn install_config_from_card(&self, card_root: &Path) -> anyhow::Result<bool> {
        let card_path = card_root.join(&self.settings.config_file_name);
        let content = tokio::fs::read_to_string(&card_path)
            .await
            .with_context(|| format!("Failed to read {}", card_path.display()))?;
        let _: Config = serde_json::from_str(&content)
            .with_context(|| format!("{} is not valid JSON", card_path.display()))?;

        if let Ok(existing) = tokio::fs::read_to_string(&self.settings.local_config_path).await {
            if existing == content {
                debug!("Card configuration matches the local copy");
                return Ok(false);
            }
        }

        tokio::fs::write(&self.settings.local_config_path, &content)
            .await
            .with_context(|| {
                format!(
                    "Failed to persist configuration to {}",
                    self.settings.local_config_path.display()
                )
            })?;
        info!("Installed configuration from removable storage");
        Ok(true)
    }

    // ========================================================================
    // T146: directory preparation
    // ========================================================================

    async fn prepare_directories(
        &self,
        device_id: &DeviceId,
        config: &Config,
        storage_root: Option<&Path>,
    ) -> Result<DirectoryLayout, BootError> {
        // When the card is back after a cardless run, fold the local
        // fallback tree into it first so nothing is stranded.
        if let Some(card_root) = storage_root {
            let local_upload = self.settings.local_root.join(&self.settings.upload_dir_name);
            let card_upload = card_root.join(&self.settings.upload_dir_name);
            storage::merge_local_fallback(&local_upload, &card_upload)
                .await
                .map_err(BootError::StoragePreparation)?;
        }

        let identity = StorageIdentity::new(
            ProjectId::new(config.device.project_id.clone())
                .unwrap_or_else(|_| ProjectId::placeholder()),
            device_id.clone(),
            ConfigId::new(config.device.config_id.clone())
                .unwrap_or_else(|_| ConfigId::placeholder()),
        );

        let root = storage_root.unwrap_or(&self.settings.local_root);
        let layout = DirectoryLayout::derive(
            root,
            &self.settings.working_root,
            &self.settings.upload_dir_name,
            &identity,
        );
        layout
            .validate()
            .map_err(|e| BootError::StoragePreparation(e.into()))?;

        storage::reconcile(&layout)
            .await
            .map_err(BootError::StoragePreparation)?;

        if let Some(current) = &self.settings.current_log_file {
            match storage::stage_previous_logs(&self.settings.log_dir, current, &layout.upload_dir)
                .await
            {
                Ok(moved) if moved > 0 => info!(count = moved, "Staged previous run logs"),
                Ok(_) => {}
                // Not critical - logs can stay in the log dir.
                Err(e) => warn!(error = format!("{e:#}"), "Could not stage previous logs"),
            }
        }

        Ok(layout)
    }
}

// ============================================================================
// Unit tests
// ============================================================================

//! Capture supervisor
//!
//! The perpetual sense-and-store loop. Each cycle: light the record LED,
//! capture one artifact, hand it to postprocessing as an independent task,
//! dim the LED, let the sensor rest. The handoff transfers ownership of
//! the artifact; this supervisor never touches it again, so capture of the
//! next artifact overlaps compression of the previous one.
//!
//! Failure semantics: a sensor failure is assumed systemic, not transient.
//! Any error escaping a cycle aborts the loop and is returned to the
//! caller for watchdog escalation; there is no local retry.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use ecopod_core::domain::layout::DirectoryLayout;
use ecopod_core::domain::reboot::RebootPolicy;
use ecopod_core::domain::runtime::DeviceRuntimeState;
use ecopod_core::ports::capture::ICaptureSensor;
use ecopod_core::ports::indicator::{IIndicator, LedState, StatusGroup};
use ecopod_core::ports::system::ISystemControl;

// ============================================================================
// T121: CaptureSupervisor
// ============================================================================

/// Runs the capture→handoff→rest cycle until shutdown or failure
pub struct CaptureSupervisor {
    sensor: Arc<dyn ICaptureSensor>,
    indicator: Arc<dyn IIndicator>,
    system: Arc<dyn ISystemControl>,
    runtime: Arc<DeviceRuntimeState>,
    layout: DirectoryLayout,
    reboot_policy: RebootPolicy,
    shutdown: CancellationToken,
}

impl CaptureSupervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sensor: Arc<dyn ICaptureSensor>,
        indicator: Arc<dyn IIndicator>,
        system: Arc<dyn ISystemControl>,
        runtime: Arc<DeviceRuntimeState>,
        layout: DirectoryLayout,
        reboot_policy: RebootPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sensor,
            indicator,
            system,
            runtime,
            layout,
            reboot_policy,
            shutdown,
        }
    }

    // ========================================================================
    // T122: run loop
    // ========================================================================

    /// Runs cycles until the shutdown signal is observed at a cycle
    /// boundary. An `Err` means a cycle failed and the device needs the
    /// watchdog; the in-flight cycle is abandoned.
    pub async fn run(self) -> Result<()> {
        info!("Capture supervisor started");

        while !self.shutdown.is_cancelled() {
            self.cycle()
                .await
                .context("Capture cycle failed; escalating")?;
        }

        self.indicator.set_state(StatusGroup::Record, LedState::OFF);
        info!("Capture supervisor stopped");
        Ok(())
    }

    // ========================================================================
    // T123: one cycle
    // ========================================================================

    async fn cycle(&self) -> Result<()> {
        debug!(
            mode = %self.runtime.mode(),
            connected = self.runtime.is_connected(),
            "Starting capture cycle"
        );

        self.indicator
            .set_state(StatusGroup::Record, LedState::RECORDING);

        let artifact = self
            .sensor
            .capture(&self.layout.working_dir, &self.layout.data_dir)
            .await
            .context("Sensor capture failed")?;

        // Decide rotation before handoff so the check reflects the cycle
        // that produced the artifact, not whenever compression finishes.
        let reboot_after = self
            .reboot_policy
            .is_due(self.system.uptime()?, Utc::now());

        let name = artifact.name.clone();
        info!(artifact = %name, reboot_after, "Handing artifact to postprocessing");

        // Ownership of the artifact moves into the task; the supervisor
        // starts the next capture without waiting for it.
        let sensor = Arc::clone(&self.sensor);
        let system = Arc::clone(&self.system);
        tokio::spawn(async move {
            if let Err(e) = sensor.postprocess(artifact).await {
                warn!(artifact = %name, error = format!("{e:#}"), "Postprocessing failed");
                return;
            }
            debug!(artifact = %name, "Postprocessing complete");

            if reboot_after {
                info!("Scheduled reboot due; postprocessing complete, rebooting");
                if let Err(e) = system.reboot().await {
                    error!(error = format!("{e:#}"), "Scheduled reboot invocation failed");
                }
            }
        });

        self.indicator.set_state(StatusGroup::Record, LedState::OFF);
        self.sensor.rest().await;

        Ok(())
    }
}

// ============================================================================
// Unit tests
// ============================================================================

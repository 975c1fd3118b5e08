//! Connectivity & power controller
//!
//! Owns the cellular modem's duty cycle. The modem is the single largest
//! consumer on the power budget after the CPU, so it is powered only while
//! a sync cycle needs it; `disable()` runs after every cycle regardless of
//! outcome.
//!
//! Exactly one logical actor drives the modem at a time: the boot
//! sequencer borrows the controller for its one-off probe, then the sync
//! supervisor takes ownership for the rest of the run. Power state and
//! logical connectivity are independent - see [`ConnectOutcome`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use ecopod_core::ports::indicator::{IIndicator, LedState, StatusGroup};
use ecopod_core::ports::modem::IModemControl;
use ecopod_core::ports::system::ISystemControl;

/// Default host probed for reachability (a HEAD request; any response counts)
const DEFAULT_PROBE_URL: &str = "http://google.com";

// ============================================================================
// T111: Settings
// ============================================================================

/// Timing and endpoint knobs for the controller.
///
/// Production uses the defaults; tests shrink the delays.
#[derive(Debug, Clone)]
pub struct ConnectivitySettings {
    /// URL probed to decide reachability
    pub probe_url: String,
    /// Per-probe timeout
    pub probe_timeout: Duration,
    /// Sleep between reachability probes
    pub probe_retry_delay: Duration,
    /// Sleep after asserting the enable line, before the power-on pulse
    pub enable_settle: Duration,
    /// Bus enumeration poll attempts
    pub enumeration_tries: u32,
    /// Sleep between enumeration polls
    pub enumeration_delay: Duration,
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        Self {
            probe_url: DEFAULT_PROBE_URL.to_string(),
            probe_timeout: Duration::from_secs(2),
            probe_retry_delay: Duration::from_secs(1),
            enable_settle: Duration::from_secs(1),
            enumeration_tries: 10,
            enumeration_delay: Duration::from_secs(2),
        }
    }
}

// ============================================================================
// T112: ConnectOutcome
// ============================================================================

/// Result of one `ensure_connected` attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Modem up, internet reachable, clock corrected
    Connected,
    /// Modem enumerated but no route to the internet this cycle
    Unreachable,
    /// Modem never enumerated on the bus (power left asserted - a slow
    /// modem may still come up, and re-pulsing would toggle it off)
    NoModem,
}

impl ConnectOutcome {
    /// Whether upload work can proceed
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

// ============================================================================
// T113: ConnectivityController
// ============================================================================

/// Modem power sequencing plus reachability probing
pub struct ConnectivityController {
    modem: Arc<dyn IModemControl>,
    system: Arc<dyn ISystemControl>,
    indicator: Arc<dyn IIndicator>,
    http: reqwest::Client,
    settings: ConnectivitySettings,
}

impl ConnectivityController {
    pub fn new(
        modem: Arc<dyn IModemControl>,
        system: Arc<dyn ISystemControl>,
        indicator: Arc<dyn IIndicator>,
        settings: ConnectivitySettings,
    ) -> Self {
        Self {
            modem,
            system,
            indicator,
            http: reqwest::Client::new(),
            settings,
        }
    }

    // ========================================================================
    // T114: Power-on and enumeration
    // ========================================================================

    /// Powers the modem and waits for it to enumerate on the bus.
    ///
    /// Assert enable, settle, pulse the power-on line (push-button
    /// semantics - the pulse is owned by the adapter and never shortened),
    /// then poll enumeration with bounded fixed-interval retries. On
    /// exhaustion the enable line stays asserted.
    pub async fn power_on_and_enumerate(&self) -> bool {
        info!("Powering modem on");
        if let Err(e) = self.modem.set_enable_line(true).await {
            warn!(error = %e, "Failed to assert modem enable line");
            return false;
        }
        tokio::time::sleep(self.settings.enable_settle).await;

        if let Err(e) = self.modem.pulse_power_on_line().await {
            warn!(error = %e, "Failed to pulse modem power-on line");
            return false;
        }

        debug!("Waiting for modem to boot and enumerate");
        for attempt in 1..=self.settings.enumeration_tries {
            if self.modem.is_enumerated().await {
                info!(attempt, "Modem enumerated on the bus");
                return true;
            }
            tokio::time::sleep(self.settings.enumeration_delay).await;
        }

        warn!(
            tries = self.settings.enumeration_tries,
            "Modem did not enumerate; leaving power asserted"
        );
        false
    }

    // ========================================================================
    // T115: Reachability probing
    // ========================================================================

    /// One reachability probe, without retries or LED updates.
    async fn probe_once(&self) -> bool {
        match self
            .http
            .head(&self.settings.probe_url)
            .timeout(self.settings.probe_timeout)
            .send()
            .await
        {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Reachability probe failed");
                false
            }
        }
    }

    /// Repeatedly probes for reachability, updating the data LED with the
    /// final verdict.
    pub async fn wait_for_reachability(&self, max_tries: u32) -> bool {
        info!("Waiting for internet connection");
        for attempt in 1..=max_tries {
            if self.probe_once().await {
                info!(attempt, "Connected to the internet");
                self.indicator
                    .set_state(StatusGroup::Data, LedState::CONNECTED);
                return true;
            }
            tokio::time::sleep(self.settings.probe_retry_delay).await;
        }

        info!(tries = max_tries, "No internet connection");
        self.indicator
            .set_state(StatusGroup::Data, LedState::NO_CONNECTION);
        false
    }

    /// Single probe with LED update; used for the pre-offset status check
    /// before the first sync cycle.
    pub async fn check_connection(&self) -> bool {
        let reachable = self.probe_once().await;
        let state = if reachable {
            LedState::CONNECTED
        } else {
            LedState::NO_CONNECTION
        };
        self.indicator.set_state(StatusGroup::Data, state);
        reachable
    }

    // ========================================================================
    // T116: ensure_connected / disable
    // ========================================================================

    /// Full connect sequence: power on, enumerate, probe, correct clock.
    ///
    /// Clock correction failure is logged and otherwise ignored - a pod
    /// with a drifting clock still records usable data.
    pub async fn ensure_connected(&self, max_tries: u32) -> ConnectOutcome {
        if !self.power_on_and_enumerate().await {
            self.indicator
                .set_state(StatusGroup::Data, LedState::NO_CONNECTION);
            return ConnectOutcome::NoModem;
        }

        if !self.wait_for_reachability(max_tries).await {
            return ConnectOutcome::Unreachable;
        }

        if let Err(e) = self.system.sync_clock().await {
            warn!(error = format!("{e:#}"), "Clock synchronisation failed");
        }

        ConnectOutcome::Connected
    }

    /// Deasserts the modem enable line unconditionally.
    pub async fn disable(&self) {
        match self.modem.set_enable_line(false).await {
            Ok(()) => info!("Modem power disabled until next sync"),
            Err(e) => warn!(error = %e, "Failed to disable modem power"),
        }
    }
}

// ============================================================================
// Unit tests
// ============================================================================

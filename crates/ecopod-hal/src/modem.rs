//! Sierra Wireless modem control over GPIO
//!
//! Two lines: 3V7_EN (supply enable, BCM 8) and POWER_ON_N (push-button
//! power-on, BCM 5, pulsed high for one second). Enumeration is checked
//! by looking for the modem in the USB device listing; the mobile network
//! profile is installed through the system connection manager.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use ecopod_core::config::MobileNetworkConfig;
use ecopod_core::ports::modem::IModemControl;

use crate::gpio::SysfsGpio;

/// BCM pin driving 3V7_EN
pub const MODEM_ENABLE_PIN: u32 = 8;

/// BCM pin driving POWER_ON_N
pub const MODEM_POWER_ON_PIN: u32 = 5;

/// POWER_ON_N pulse width (push-button press)
const POWER_ON_PULSE: Duration = Duration::from_secs(1);

/// Substring identifying the modem in the USB listing
const USB_MODEM_MATCH: &str = "Sierra Wireless";

// ============================================================================
// T171: helpers
// ============================================================================

/// Whether a `lsusb` listing shows the modem.
fn listing_shows_modem(listing: &str, modem_match: &str) -> bool {
    listing.contains(modem_match)
}

/// Assembles the `nmcli connection add` arguments for a GSM profile.
///
/// Blank usernames/passwords are omitted entirely; some carriers reject
/// profiles carrying empty credential fields.
fn nmcli_add_args(profile: &MobileNetworkConfig, connection_name: &str) -> Vec<String> {
    let mut args = vec![
        "connection".to_string(),
        "add".to_string(),
        "type".to_string(),
        "gsm".to_string(),
        "ifname".to_string(),
        "*".to_string(),
        "con-name".to_string(),
        connection_name.to_string(),
        "apn".to_string(),
        profile.hostname.clone(),
        "connection.autoconnect".to_string(),
        "yes".to_string(),
    ];
    if !profile.username.trim().is_empty() {
        args.extend(["gsm.username".to_string(), profile.username.clone()]);
    }
    if !profile.password.trim().is_empty() {
        args.extend(["gsm.password".to_string(), profile.password.clone()]);
    }
    args
}

/// Connection-manager profile name derived from the APN hostname.
fn connection_name(profile: &MobileNetworkConfig) -> String {
    format!("{}-ecopod", profile.hostname.replace('.', ""))
}

// ============================================================================
// T172: GpioModemControl
// ============================================================================

/// Modem control lines on the pod's GPIO header
pub struct GpioModemControl {
    enable: SysfsGpio,
    power_on: SysfsGpio,
}

impl GpioModemControl {
    /// Exports and claims both modem control lines.
    pub async fn new() -> Result<Self> {
        let enable = SysfsGpio::export_output(MODEM_ENABLE_PIN)
            .await
            .context("Failed to claim modem enable line")?;
        let power_on = SysfsGpio::export_output(MODEM_POWER_ON_PIN)
            .await
            .context("Failed to claim modem power-on line")?;
        Ok(Self { enable, power_on })
    }

    /// Builds the control from already-claimed lines (tests).
    pub fn with_lines(enable: SysfsGpio, power_on: SysfsGpio) -> Self {
        Self { enable, power_on }
    }
}

#[async_trait::async_trait]
impl IModemControl for GpioModemControl {
    async fn set_enable_line(&self, enabled: bool) -> Result<()> {
        debug!(enabled, "Driving modem enable line");
        self.enable.write(enabled).await
    }

    async fn pulse_power_on_line(&self) -> Result<()> {
        debug!("Pulsing POWER_ON_N high");
        self.power_on.write(true).await?;
        tokio::time::sleep(POWER_ON_PULSE).await;
        self.power_on.write(false).await
    }

    async fn is_enumerated(&self) -> bool {
        let output = tokio::process::Command::new("lsusb")
            .stdin(Stdio::null())
            .output()
            .await;
        match output {
            Ok(output) => {
                listing_shows_modem(&String::from_utf8_lossy(&output.stdout), USB_MODEM_MATCH)
            }
            Err(e) => {
                debug!(error = %e, "Could not list USB devices");
                false
            }
        }
    }

    async fn configure_apn(&self, profile: &MobileNetworkConfig) -> Result<()> {
        let name = connection_name(profile);
        info!(
            connection = %name,
            apn = %profile.hostname,
            "Installing mobile network profile"
        );

        let status = tokio::process::Command::new("nmcli")
            .args(nmcli_add_args(profile, &name))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .context("Failed to run nmcli")?;

        if !status.success() {
            anyhow::bail!("nmcli exited with {status}");
        }
        Ok(())
    }
}

// ============================================================================
// Unit tests
// ============================================================================

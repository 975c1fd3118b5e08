//! Cellular modem hardware control port (driven/secondary port)
//!
//! The modem has two hardware lines: a supply-enable line and a push-button
//! style power-on line that must be pulsed after enable. Power state and
//! logical connectivity are independent: an enabled modem may take many
//! seconds to enumerate on the bus, and an enumerated modem may still have
//! no network.

use crate::config::MobileNetworkConfig;

/// Port trait for modem power and bus control
#[async_trait::async_trait]
pub trait IModemControl: Send + Sync {
    /// Asserts or deasserts the modem supply-enable line.
    async fn set_enable_line(&self, enabled: bool) -> anyhow::Result<()>;

    /// Pulses the power-on line high for the fixed settle interval, then
    /// releases it. Mirrors a physical push-button power-on; the pulse
    /// must not be skipped or shortened.
    async fn pulse_power_on_line(&self) -> anyhow::Result<()>;

    /// Whether the modem has enumerated on the bus.
    async fn is_enumerated(&self) -> bool;

    /// Installs the mobile-network profile (APN, credentials) into the
    /// system's connection manager. Called when a new configuration is
    /// taken from removable storage; failures are non-fatal.
    async fn configure_apn(&self, profile: &MobileNetworkConfig) -> anyhow::Result<()>;
}

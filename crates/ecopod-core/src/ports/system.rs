//! System control port (driven/secondary port)
//!
//! Identity, uptime, clock correction and reboot. Kept on one trait
//! because all four are thin views over the same host OS surface.

use std::time::Duration;

use crate::domain::newtypes::DeviceId;

/// Port trait for host system operations
#[async_trait::async_trait]
pub trait ISystemControl: Send + Sync {
    /// The unique hardware identity of this pod. Failure here is
    /// boot-fatal: directory naming depends on it.
    fn device_id(&self) -> anyhow::Result<DeviceId>;

    /// Seconds since the host booted.
    fn uptime(&self) -> anyhow::Result<Duration>;

    /// Corrects the system clock from a network time source and persists
    /// the corrected time to the hardware RTC if present. Callers treat
    /// failure as non-fatal.
    async fn sync_clock(&self) -> anyhow::Result<()>;

    /// Reboots the device. Does not return on success in production; the
    /// `Result` exists for the window between invocation and shutdown
    /// (and for test doubles).
    async fn reboot(&self) -> anyhow::Result<()>;
}

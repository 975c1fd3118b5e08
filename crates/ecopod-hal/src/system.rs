//! Host system adapter
//!
//! Identity from the CPU serial, uptime from `/proc/uptime`, clock
//! correction via `ntpdate` with write-back to the hardware RTC, and the
//! reboot invocation. The parsers are pure functions so they can be
//! exercised against captured `/proc` text.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use ecopod_core::domain::newtypes::DeviceId;
use ecopod_core::ports::system::ISystemControl;

/// NTP host used for clock correction
const NTP_HOST: &str = "ntp.ubuntu.com";

/// Upper bound on one ntpdate invocation
const NTP_TIMEOUT_SECS: u32 = 180;

/// ntpdate prints this on a successful adjustment
const NTP_SUCCESS_MARKER: &str = "adjust time server";

/// Prefix carried by every pod identity
const DEVICE_ID_PREFIX: &str = "RPiID";

// ============================================================================
// T173: pure parsers
// ============================================================================

/// Extracts the serial number from `/proc/cpuinfo` content.
fn parse_cpu_serial(cpuinfo: &str) -> Option<String> {
    for line in cpuinfo.lines() {
        if let Some(rest) = line.strip_prefix("Serial") {
            if let Some((_, value)) = rest.split_once(':') {
                let value = value.trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

/// Parses the first field of `/proc/uptime` (seconds since boot).
fn parse_uptime_secs(uptime: &str) -> Result<f64> {
    uptime
        .split_whitespace()
        .next()
        .context("Empty /proc/uptime")?
        .parse::<f64>()
        .context("Malformed /proc/uptime")
}

// ============================================================================
// T174: LinuxSystemControl
// ============================================================================

/// The host-OS surface of one pod
#[derive(Debug, Default)]
pub struct LinuxSystemControl;

impl LinuxSystemControl {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl ISystemControl for LinuxSystemControl {
    fn device_id(&self) -> Result<DeviceId> {
        let cpuinfo =
            std::fs::read_to_string("/proc/cpuinfo").context("Failed to read /proc/cpuinfo")?;
        let serial =
            parse_cpu_serial(&cpuinfo).context("No serial number found in /proc/cpuinfo")?;
        DeviceId::new(format!("{DEVICE_ID_PREFIX}-{serial}")).map_err(Into::into)
    }

    fn uptime(&self) -> Result<Duration> {
        let uptime =
            std::fs::read_to_string("/proc/uptime").context("Failed to read /proc/uptime")?;
        Ok(Duration::from_secs_f64(parse_uptime_secs(&uptime)?))
    }

    async fn sync_clock(&self) -> Result<()> {
        info!(host = NTP_HOST, "Correcting system clock from network time");
        let output = tokio::process::Command::new("timeout")
            .args([&NTP_TIMEOUT_SECS.to_string(), "ntpdate", NTP_HOST])
            .stdin(Stdio::null())
            .output()
            .await
            .context("Failed to run ntpdate")?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.contains(NTP_SUCCESS_MARKER) {
            bail!("ntpdate did not adjust the clock: {}", stdout.trim());
        }

        // Persist the corrected time so the next boot starts sane even
        // without a network.
        debug!("Writing corrected time to hardware RTC");
        let status = tokio::process::Command::new("hwclock")
            .arg("-w")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .context("Failed to run hwclock")?;
        if !status.success() {
            bail!("hwclock -w exited with {status}");
        }
        Ok(())
    }

    async fn reboot(&self) -> Result<()> {
        info!("Invoking system reboot");
        let status = tokio::process::Command::new("reboot")
            .status()
            .await
            .context("Failed to invoke reboot")?;
        if !status.success() {
            bail!("reboot exited with {status}");
        }
        Ok(())
    }
}

// ============================================================================
// Unit tests
// ============================================================================

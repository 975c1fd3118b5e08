//! Sysfs GPIO output lines
//!
//! Minimal driver for the two modem control lines: export the pin, set it
//! to output, write values. The sysfs interface is file-based, which also
//! makes this module testable against a temp directory standing in for
//! `/sys/class/gpio`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

/// Kernel GPIO interface root
const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// How long to wait for the kernel to materialise a freshly exported pin
const EXPORT_SETTLE: Duration = Duration::from_millis(100);
const EXPORT_RETRIES: u32 = 5;

/// One exported GPIO output line
#[derive(Debug)]
pub struct SysfsGpio {
    pin: u32,
    pin_dir: PathBuf,
}

impl SysfsGpio {
    /// Exports `pin` as an output on the real sysfs tree.
    pub async fn export_output(pin: u32) -> Result<Self> {
        Self::export_output_at(Path::new(SYSFS_GPIO_ROOT), pin).await
    }

    /// Exports `pin` under an explicit sysfs root (tests use a temp dir).
    pub async fn export_output_at(root: &Path, pin: u32) -> Result<Self> {
        let pin_dir = root.join(format!("gpio{pin}"));

        if tokio::fs::metadata(&pin_dir).await.is_err() {
            tokio::fs::write(root.join("export"), pin.to_string())
                .await
                .with_context(|| format!("Failed to export GPIO {pin}"))?;
        }

        // The pin directory appears asynchronously after export.
        let mut attempts = 0;
        loop {
            match tokio::fs::write(pin_dir.join("direction"), "out").await {
                Ok(()) => break,
                Err(e) if attempts < EXPORT_RETRIES => {
                    debug!(pin, error = %e, "GPIO not ready yet, retrying");
                    attempts += 1;
                    tokio::time::sleep(EXPORT_SETTLE).await;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to set GPIO {pin} direction"))
                }
            }
        }

        Ok(Self { pin, pin_dir })
    }

    /// Drives the line high or low.
    pub async fn write(&self, high: bool) -> Result<()> {
        tokio::fs::write(self.pin_dir.join("value"), if high { "1" } else { "0" })
            .await
            .with_context(|| format!("Failed to write GPIO {}", self.pin))
    }

    /// The BCM pin number this line drives
    pub fn pin(&self) -> u32 {
        self.pin
    }
}

//! Removable SD-card adapter
//!
//! Mounts the external card read-write over the `mmcblk1` partitions and
//! verifies it with a write probe in every subdirectory. Partially
//! corrupt cards are the motivating failure: they read fine and accept
//! writes in some directories but not others, which would silently drop
//! recordings weeks later.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use ecopod_core::ports::removable_storage::IRemovableStorage;

/// Default mount point for the external card
const DEFAULT_MOUNT_POINT: &str = "/mnt/sd";

/// Device-name fragment identifying card partitions under /dev
const DEFAULT_DEVICE_PATTERN: &str = "mmcblk1p";

/// Windows drops this directory onto every card it touches; probing it
/// is pointless.
const IGNORED_SUBDIR: &str = "System Volume Information";

/// Probe file written and removed in each subdirectory
const PROBE_FILE: &str = "test_f.txt";

// ============================================================================
// T175: /proc/mounts parsing
// ============================================================================

/// Whether `mounts` (text of /proc/mounts) shows `path` as a mount point.
fn is_listed_mount(mounts: &str, path: &Path) -> bool {
    let needle = path.to_string_lossy();
    mounts
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|mount_point| mount_point == needle)
}

// ============================================================================
// T176: SdCardStorage
// ============================================================================

/// The pod's external SD card
pub struct SdCardStorage {
    mount_point: PathBuf,
    device_pattern: String,
}

impl SdCardStorage {
    pub fn new() -> Self {
        Self {
            mount_point: PathBuf::from(DEFAULT_MOUNT_POINT),
            device_pattern: DEFAULT_DEVICE_PATTERN.to_string(),
        }
    }

    /// Custom mount point and device pattern.
    pub fn with_target(mount_point: PathBuf, device_pattern: impl Into<String>) -> Self {
        Self {
            mount_point,
            device_pattern: device_pattern.into(),
        }
    }

    async fn is_mounted(&self) -> Result<bool> {
        let mounts = tokio::fs::read_to_string("/proc/mounts")
            .await
            .context("Failed to read /proc/mounts")?;
        Ok(is_listed_mount(&mounts, &self.mount_point))
    }

    /// Partitions under /dev that could be the card.
    async fn candidate_devices(&self) -> Result<Vec<String>> {
        let mut devices = Vec::new();
        let mut entries = tokio::fs::read_dir("/dev")
            .await
            .context("Failed to read /dev")?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.contains(&self.device_pattern) {
                devices.push(name);
            }
        }
        devices.sort();
        Ok(devices)
    }
}

impl Default for SdCardStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl IRemovableStorage for SdCardStorage {
    async fn mount(&self) -> Result<PathBuf> {
        if self.is_mounted().await? {
            warn!(
                mount_point = %self.mount_point.display(),
                "Device already mounted here; assuming it is the SD card"
            );
            return Ok(self.mount_point.clone());
        }

        // Start from an empty mount point.
        if tokio::fs::metadata(&self.mount_point).await.is_ok() {
            tokio::fs::remove_dir_all(&self.mount_point)
                .await
                .context("Failed to clear mount point")?;
        }
        tokio::fs::create_dir_all(&self.mount_point)
            .await
            .context("Failed to create mount point")?;

        for device in self.candidate_devices().await? {
            info!(device = %device, mount_point = %self.mount_point.display(), "Trying to mount");
            let _ = tokio::process::Command::new("mount")
                .arg("-orw")
                .arg(format!("/dev/{device}"))
                .arg(&self.mount_point)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;

            if self.is_mounted().await? {
                info!(device = %device, "Mounted external SD card");
                return Ok(self.mount_point.clone());
            }
        }

        bail!(
            "Could not mount external SD card to {}",
            self.mount_point.display()
        )
    }

    /// Writes and deletes a probe file in every subdirectory under `root`.
    async fn verify_writable(&self, root: &Path) -> Result<()> {
        let mut dirs = vec![root.to_path_buf()];
        let mut index = 0;

        // Iterative walk; the card's tree is shallow and a queue avoids
        // recursive future boxing here.
        while index < dirs.len() {
            let dir = dirs[index].clone();
            index += 1;

            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .with_context(|| format!("Failed to read {}", dir.display()))?;
            while let Some(entry) = entries.next_entry().await? {
                if !entry.metadata().await?.is_dir() {
                    continue;
                }
                if entry.file_name().to_string_lossy().contains(IGNORED_SUBDIR) {
                    continue;
                }
                dirs.push(entry.path());
            }
        }

        for dir in &dirs {
            let probe = dir.join(PROBE_FILE);
            tokio::fs::write(&probe, b"")
                .await
                .with_context(|| format!("Write probe failed in {}", dir.display()))?;
            tokio::fs::remove_file(&probe)
                .await
                .with_context(|| format!("Probe cleanup failed in {}", dir.display()))?;
        }

        info!(directories = dirs.len(), "SD card passed the write probe");
        Ok(())
    }
}

// ============================================================================
// Unit tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_MOUNTS: &str = "\
/dev/root / ext4 rw,noatime 0 0
devtmpfs /dev devtmpfs rw,relatime 0 0
/dev/mmcblk1p1 /mnt/sd vfat rw,relatime 0 0
tmpfs /tmp tmpfs rw,nosuid 0 0
";

    #[test]
    fn detects_listed_mount_point() {
        assert!(is_listed_mount(SAMPLE_MOUNTS, Path::new("/mnt/sd")));
        assert!(!is_listed_mount(SAMPLE_MOUNTS, Path::new("/mnt/other")));
        // Prefixes must not match.
        assert!(!is_listed_mount(SAMPLE_MOUNTS, Path::new("/mnt")));
    }

    #[tokio::test]
    async fn write_probe_accepts_healthy_tree() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("captures/proj_a")).unwrap();
        std::fs::create_dir_all(tmp.path().join("captures/proj_b/deep")).unwrap();

        let sd = SdCardStorage::new();
        sd.verify_writable(tmp.path()).await.unwrap();

        // Probes cleaned up everywhere.
        assert!(!tmp.path().join(PROBE_FILE).exists());
        assert!(!tmp.path().join("captures/proj_a").join(PROBE_FILE).exists());
    }

    #[tokio::test]
    async fn write_probe_skips_windows_metadata_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let sysdir = tmp.path().join(IGNORED_SUBDIR);
        std::fs::create_dir_all(&sysdir).unwrap();

        let sd = SdCardStorage::new();
        sd.verify_writable(tmp.path()).await.unwrap();

        assert!(!sysdir.join(PROBE_FILE).exists());
    }

    #[tokio::test]
    async fn write_probe_fails_on_unreadable_root() {
        let sd = SdCardStorage::new();
        assert!(sd
            .verify_writable(Path::new("/nonexistent/sd"))
            .await
            .is_err());
    }
}

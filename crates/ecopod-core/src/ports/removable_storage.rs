//! Removable storage port (driven/secondary port)
//!
//! Mounting and verifying the external SD card. Verification exists
//! because partially corrupt cards will accept writes in some locations
//! but not others; a card that fails the probe is treated as absent.

use std::path::{Path, PathBuf};

/// Port trait for the removable storage device
#[async_trait::async_trait]
pub trait IRemovableStorage: Send + Sync {
    /// Mounts the card read-write and returns the mount root. Succeeds
    /// without side effects if already mounted.
    async fn mount(&self) -> anyhow::Result<PathBuf>;

    /// Probes every subdirectory under `root` with a write-and-delete to
    /// catch partial corruption. Errors mean the card must not be used.
    async fn verify_writable(&self, root: &Path) -> anyhow::Result<()>;
}

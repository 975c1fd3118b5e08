//! Remote object store port (driven/secondary port)
//!
//! One operation: put a local file at a relative key. The sync supervisor
//! deletes the local file only after `upload` returns `Ok`, which is the
//! at-least-once delivery contract - implementations must not report
//! success before the store has acknowledged the object.

use std::path::Path;

use crate::domain::newtypes::ObjectKey;

/// Port trait for the cloud object store
#[async_trait::async_trait]
pub trait IRemoteStore: Send + Sync {
    /// Uploads `local_path` to the store under `key`.
    ///
    /// An `Err` means the object may or may not exist remotely; the caller
    /// keeps the local file and retries on a later cycle.
    async fn upload(&self, local_path: &Path, key: &ObjectKey) -> anyhow::Result<()>;
}

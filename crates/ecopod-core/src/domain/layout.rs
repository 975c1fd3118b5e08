//! Directory layout derivation
//!
//! Three paths drive the producer/consumer handoff between the capture and
//! sync workers:
//!
//! - `working_dir`: scratch space for in-progress recordings. Anything
//!   found here at boot is unrecoverable and gets wiped.
//! - `upload_dir`: the tree mirrored into the remote store. Every file
//!   under it is a finished artifact, safe to transmit and delete.
//! - `data_dir`: the project/device/config-scoped subdirectory of
//!   `upload_dir` that postprocessing writes completed artifacts into.
//!
//! Invariant: `data_dir` is nested under `upload_dir`; `working_dir` is
//! never under `upload_dir` (a half-written file must not be visible to
//! the sync worker).

use std::path::{Path, PathBuf};

use super::errors::DomainError;
use super::newtypes::{ConfigId, DeviceId, ProjectId};

/// Directory name used for scratch space under the working root
const WORKING_DIR_NAME: &str = "ecopod_tmp";

/// Suffix for files being finalised inside the upload tree.
///
/// Producers move a finished artifact into `data_dir` by copying to a
/// `.part` name and renaming, so the final name only ever appears with
/// complete content. The sync walk skips `.part` files; reconcile removes
/// any left behind by an unclean shutdown.
pub const PARTIAL_SUFFIX: &str = ".part";

// ============================================================================
// T014: StorageIdentity
// ============================================================================

/// The identity triple that scopes a pod's data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageIdentity {
    pub project_id: ProjectId,
    pub device_id: DeviceId,
    pub config_id: ConfigId,
}

impl StorageIdentity {
    pub fn new(project_id: ProjectId, device_id: DeviceId, config_id: ConfigId) -> Self {
        Self {
            project_id,
            device_id,
            config_id,
        }
    }
}

// ============================================================================
// T015: DirectoryLayout
// ============================================================================

/// The three working paths of one run, derived deterministically from the
/// storage root and the identity triple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryLayout {
    /// Scratch space for in-progress captures (wiped at boot)
    pub working_dir: PathBuf,
    /// Root of the tree synchronised with the remote store
    pub upload_dir: PathBuf,
    /// `upload_dir/proj_<p>/pod_<d>/conf_<c>` - where finished artifacts land
    pub data_dir: PathBuf,
}

impl DirectoryLayout {
    /// Derives the layout for a run.
    ///
    /// `storage_root` is the removable card mount or the local fallback
    /// root depending on the resolved device mode; `working_root` is
    /// independent scratch storage (typically `/tmp`); `upload_dir_name`
    /// names the sync tree under the storage root.
    #[must_use]
    pub fn derive(
        storage_root: &Path,
        working_root: &Path,
        upload_dir_name: &str,
        identity: &StorageIdentity,
    ) -> Self {
        let upload_dir = storage_root.join(upload_dir_name);
        let data_dir = upload_dir
            .join(format!("proj_{}", identity.project_id))
            .join(format!("pod_{}", identity.device_id))
            .join(format!("conf_{}", identity.config_id));
        let working_dir = working_root.join(WORKING_DIR_NAME);

        Self {
            working_dir,
            upload_dir,
            data_dir,
        }
    }

    /// Checks the containment invariant.
    ///
    /// `data_dir` must be under `upload_dir`, and `working_dir` must not
    /// be: the sync worker deletes whatever it finds under `upload_dir`
    /// after transmission, which would destroy an in-progress recording.
    pub fn validate(&self) -> Result<(), DomainError> {
        if !self.data_dir.starts_with(&self.upload_dir) {
            return Err(DomainError::InvalidLayout(format!(
                "data_dir {} is not under upload_dir {}",
                self.data_dir.display(),
                self.upload_dir.display()
            )));
        }
        if self.working_dir.starts_with(&self.upload_dir) {
            return Err(DomainError::InvalidLayout(format!(
                "working_dir {} must not be under upload_dir {}",
                self.working_dir.display(),
                self.upload_dir.display()
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Unit tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> StorageIdentity {
        StorageIdentity::new(
            ProjectId::new("p1").unwrap(),
            DeviceId::new("d1").unwrap(),
            ConfigId::new("c1").unwrap(),
        )
    }

    #[test]
    fn derive_builds_scoped_data_dir() {
        let layout = DirectoryLayout::derive(
            Path::new("/mnt/sd"),
            Path::new("/tmp"),
            "captures",
            &identity(),
        );

        assert_eq!(layout.upload_dir, PathBuf::from("/mnt/sd/captures"));
        assert_eq!(
            layout.data_dir,
            PathBuf::from("/mnt/sd/captures/proj_p1/pod_d1/conf_c1")
        );
        assert_eq!(layout.working_dir, PathBuf::from("/tmp/ecopod_tmp"));
    }

    #[test]
    fn derive_is_deterministic() {
        let a = DirectoryLayout::derive(
            Path::new("/mnt/sd"),
            Path::new("/tmp"),
            "captures",
            &identity(),
        );
        let b = DirectoryLayout::derive(
            Path::new("/mnt/sd"),
            Path::new("/tmp"),
            "captures",
            &identity(),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn derived_layout_passes_validation() {
        let layout = DirectoryLayout::derive(
            Path::new("/mnt/sd"),
            Path::new("/tmp"),
            "captures",
            &identity(),
        );
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn validate_rejects_data_dir_outside_upload_dir() {
        let layout = DirectoryLayout {
            working_dir: PathBuf::from("/tmp/ecopod_tmp"),
            upload_dir: PathBuf::from("/mnt/sd/captures"),
            data_dir: PathBuf::from("/mnt/sd/elsewhere"),
        };
        assert!(layout.validate().is_err());
    }

    #[test]
    fn validate_rejects_working_dir_inside_upload_dir() {
        let layout = DirectoryLayout {
            working_dir: PathBuf::from("/mnt/sd/captures/tmp"),
            upload_dir: PathBuf::from("/mnt/sd/captures"),
            data_dir: PathBuf::from("/mnt/sd/captures/proj_na"),
        };
        assert!(layout.validate().is_err());
    }

    #[test]
    fn local_fallback_root_yields_relative_layout() {
        let layout =
            DirectoryLayout::derive(Path::new("."), Path::new("/tmp"), "captures", &identity());
        assert_eq!(layout.upload_dir, PathBuf::from("./captures"));
        assert!(layout.validate().is_ok());
    }
}

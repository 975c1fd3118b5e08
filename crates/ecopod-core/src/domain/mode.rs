//! Device operating mode
//!
//! The mode is decided exactly once, at boot, from three observations:
//! whether the modem enumerated, whether removable storage mounted and
//! verified writable, and where a usable configuration came from. It is
//! immutable for the life of one run; a mode change requires a reboot.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Operating mode of the pod for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceMode {
    /// Modem present; captures to removable storage and syncs on interval
    Online,
    /// No modem (or no usable configuration): capture only, no sync worker
    Offline,
    /// Removable storage absent or failed verification: captures to the
    /// local fallback root, still syncs
    NoRemovableStorage,
}

impl DeviceMode {
    /// Resolves the final mode from the boot candidates.
    ///
    /// Offline wins over no-storage: without a modem the sync worker can
    /// never do useful work, whereas a missing card only changes where
    /// data lands.
    #[must_use]
    pub fn resolve(offline_candidate: bool, no_storage_candidate: bool) -> Self {
        if offline_candidate {
            Self::Offline
        } else if no_storage_candidate {
            Self::NoRemovableStorage
        } else {
            Self::Online
        }
    }

    /// Whether the sync supervisor should run in this mode
    #[must_use]
    pub fn sync_enabled(&self) -> bool {
        !matches!(self, Self::Offline)
    }

    /// Whether data is stored on the removable card in this mode
    #[must_use]
    pub fn uses_removable_storage(&self) -> bool {
        !matches!(self, Self::NoRemovableStorage)
    }
}

impl Display for DeviceMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::NoRemovableStorage => "no_removable_storage",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_all_candidates_clear_is_online() {
        assert_eq!(DeviceMode::resolve(false, false), DeviceMode::Online);
    }

    #[test]
    fn resolve_offline_candidate_wins() {
        assert_eq!(DeviceMode::resolve(true, false), DeviceMode::Offline);
        assert_eq!(DeviceMode::resolve(true, true), DeviceMode::Offline);
    }

    #[test]
    fn resolve_no_storage_without_offline() {
        assert_eq!(
            DeviceMode::resolve(false, true),
            DeviceMode::NoRemovableStorage
        );
    }

    #[test]
    fn sync_enabled_matrix() {
        assert!(DeviceMode::Online.sync_enabled());
        assert!(DeviceMode::NoRemovableStorage.sync_enabled());
        assert!(!DeviceMode::Offline.sync_enabled());
    }

    #[test]
    fn storage_selection_matrix() {
        assert!(DeviceMode::Online.uses_removable_storage());
        assert!(DeviceMode::Offline.uses_removable_storage());
        assert!(!DeviceMode::NoRemovableStorage.uses_removable_storage());
    }

    #[test]
    fn display_names() {
        assert_eq!(DeviceMode::Online.to_string(), "online");
        assert_eq!(
            DeviceMode::NoRemovableStorage.to_string(),
            "no_removable_storage"
        );
    }
}

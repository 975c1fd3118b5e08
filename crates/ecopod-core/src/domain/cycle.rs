//! Sync cycle observability record
//!
//! One [`SyncCycle`] exists per iteration of the sync supervisor. It is
//! never persisted; the supervisor logs its counters at the end of the
//! cycle and drops it.

use chrono::{DateTime, Utc};

use super::newtypes::CycleId;

/// Summary of one connect→upload→disconnect iteration
#[derive(Debug, Clone)]
pub struct SyncCycle {
    /// Identifier for correlating log lines within one cycle
    pub id: CycleId,
    /// When the cycle started
    pub started_at: DateTime<Utc>,
    /// Whether `ensure_connected` succeeded this cycle
    pub connected: bool,
    /// Files the upload walk reached
    pub files_attempted: u32,
    /// Files uploaded and deleted locally
    pub files_uploaded: u32,
    /// Files whose upload failed (left on disk for the next cycle)
    pub files_failed: u32,
}

impl SyncCycle {
    /// Starts a new cycle record stamped with the current time.
    #[must_use]
    pub fn begin() -> Self {
        Self {
            id: CycleId::new(),
            started_at: Utc::now(),
            connected: false,
            files_attempted: 0,
            files_uploaded: 0,
            files_failed: 0,
        }
    }

    /// Records one successful upload (file transmitted and deleted).
    pub fn record_upload(&mut self) {
        self.files_uploaded += 1;
    }

    /// Records one failed upload (file left untouched).
    pub fn record_failure(&mut self) {
        self.files_failed += 1;
    }
}

//! Shared run-time device state
//!
//! [`DeviceRuntimeState`] replaces the original firmware's scattering of
//! global mutable flags with one value owned by the boot sequencer and
//! shared behind an `Arc`. The mode is immutable after boot; the
//! connectivity flag follows a single-writer discipline: the boot sequencer
//! writes it until the workers start, then the sync supervisor is the only
//! writer. Both supervisors may read it at any time without locking.

use std::sync::atomic::{AtomicBool, Ordering};

use super::mode::DeviceMode;

/// Mode plus live connectivity, shared between the two supervisors
#[derive(Debug)]
pub struct DeviceRuntimeState {
    mode: DeviceMode,
    connected: AtomicBool,
}

impl DeviceRuntimeState {
    /// Creates the state for one run; starts disconnected.
    #[must_use]
    pub fn new(mode: DeviceMode) -> Self {
        Self {
            mode,
            connected: AtomicBool::new(false),
        }
    }

    /// The mode resolved at boot (immutable for the run)
    #[must_use]
    pub fn mode(&self) -> DeviceMode {
        self.mode
    }

    /// Latest observed connectivity
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Records a connectivity observation. Single writer at a time: the
    /// boot sequencer before the workers start, the sync supervisor after.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }
}

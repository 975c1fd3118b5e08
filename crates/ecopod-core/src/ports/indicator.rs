//! Status indicator port (driven/secondary port)
//!
//! The pod's only user interface in the field is three LED groups. The
//! port is fire-and-forget: `set_state` never blocks the caller and never
//! fails observably - a broken LED must not take down recording.

/// The three indicator groups on the front panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusGroup {
    /// Recording activity
    Record,
    /// Connectivity / upload activity
    Data,
    /// Power
    Power,
}

/// An RGB on/off triple for one LED group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedState(pub bool, pub bool, pub bool);

impl LedState {
    /// All channels off
    pub const OFF: Self = Self(false, false, false);
    /// All channels on (distress blink)
    pub const ON: Self = Self(true, true, true);
    /// Green: a recording is in progress
    pub const RECORDING: Self = Self(false, true, false);
    /// Cyan: uploads in progress
    pub const UPLOADING: Self = Self(false, true, true);
    /// Blue: connected, idle
    pub const CONNECTED: Self = Self(false, false, true);
    /// Red: connection attempt failed
    pub const NO_CONNECTION: Self = Self(true, false, false);
    /// Dark: deliberately offline, not a failure
    pub const OFFLINE: Self = Self(false, false, false);
    /// Green: boot/setup in progress
    pub const SETUP: Self = Self(false, true, false);
}

/// Port trait for the LED driver
///
/// Implementations must return immediately (queue or spawn the hardware
/// write) and swallow hardware errors internally.
pub trait IIndicator: Send + Sync {
    /// Sets one group to the given state. Idempotent.
    fn set_state(&self, group: StatusGroup, state: LedState);
}

//! PCF8574 LED driver
//!
//! The front-panel LEDs hang off a PCF8574 I2C expander, active low, with
//! the record group on bits 7..5, the data group on bits 4..2 and the
//! power pair on bits 1..0. The chip exposes a single 8-bit port, so a
//! shadow register tracks the last written byte and each state change
//! rewrites the whole port.
//!
//! The port contract is fire-and-forget: `set_state` updates the shadow
//! synchronously and hands the bus write to a background task; hardware
//! errors are logged, never surfaced.

use std::process::Stdio;
use std::sync::{Arc, Mutex};

use tracing::debug;

use ecopod_core::ports::indicator::{IIndicator, LedState, StatusGroup};

/// I2C bus carrying the expander
pub const PCF8574_I2C_BUS: u8 = 1;

/// Expander address
pub const PCF8574_I2C_ADDR: u8 = 0x23;

/// Port bits of each group, in (r, g, b) order
const REC_CHANNELS: [u8; 3] = [7, 6, 5];
const DATA_CHANNELS: [u8; 3] = [4, 3, 2];
/// The power pair has no blue channel
const PWR_CHANNELS: [u8; 2] = [1, 0];

/// Applies one group's state to the shadow byte. LEDs are active low:
/// a lit channel clears its bit.
fn apply_state(shadow: u8, channels: &[u8], values: &[bool]) -> u8 {
    let mut byte = shadow;
    for (channel, lit) in channels.iter().zip(values) {
        if *lit {
            byte &= !(1 << channel);
        } else {
            byte |= 1 << channel;
        }
    }
    byte
}

/// Front-panel LEDs behind the I2C expander
pub struct Pcf8574Indicator {
    bus: u8,
    addr: u8,
    shadow: Arc<Mutex<u8>>,
}

impl Pcf8574Indicator {
    /// Creates the driver for the pod's expander, all LEDs off.
    pub fn new() -> Self {
        Self::at(PCF8574_I2C_BUS, PCF8574_I2C_ADDR)
    }

    /// Creates a driver for an arbitrary bus/address.
    pub fn at(bus: u8, addr: u8) -> Self {
        Self {
            bus,
            addr,
            // All bits high = every active-low LED off.
            shadow: Arc::new(Mutex::new(0xFF)),
        }
    }
}

impl Default for Pcf8574Indicator {
    fn default() -> Self {
        Self::new()
    }
}

impl IIndicator for Pcf8574Indicator {
    fn set_state(&self, group: StatusGroup, state: LedState) {
        let LedState(r, g, b) = state;
        let byte = {
            let mut shadow = match self.shadow.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *shadow = match group {
                StatusGroup::Record => apply_state(*shadow, &REC_CHANNELS, &[r, g, b]),
                StatusGroup::Data => apply_state(*shadow, &DATA_CHANNELS, &[r, g, b]),
                StatusGroup::Power => apply_state(*shadow, &PWR_CHANNELS, &[r, g]),
            };
            *shadow
        };

        let bus = self.bus;
        let addr = self.addr;
        tokio::spawn(async move {
            let result = tokio::process::Command::new("i2cset")
                .args([
                    "-y".to_string(),
                    bus.to_string(),
                    format!("{addr:#04x}"),
                    format!("{byte:#04x}"),
                ])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            if let Err(e) = result {
                // A dead LED driver must never take down recording.
                debug!(error = %e, "LED write failed");
            }
        });
    }
}

/// Indicator that discards every state change (headless deployments,
/// tests on machines without the expander).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullIndicator;

impl IIndicator for NullIndicator {
    fn set_state(&self, _group: StatusGroup, _state: LedState) {}
}

// ============================================================================
// Unit tests
// ============================================================================

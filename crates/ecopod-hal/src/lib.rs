//! Ecopod HAL - Linux adapters for the hardware ports
//!
//! Everything here is plumbing around the orchestration core: sysfs GPIO
//! lines for the modem, the PCF8574 LED driver, SD-card mounting, and the
//! host-OS surface (identity, uptime, clock, reboot). Each adapter keeps
//! a pure, unit-tested helper layer (parsers, command assembly, bit
//! arithmetic) under the thin I/O shell.

pub mod gpio;
pub mod indicator;
pub mod modem;
pub mod sd_card;
pub mod system;

pub use indicator::{NullIndicator, Pcf8574Indicator};
pub use modem::GpioModemControl;
pub use sd_card::SdCardStorage;
pub use system::LinuxSystemControl;

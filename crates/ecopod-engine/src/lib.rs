//! Ecopod Engine - device orchestration core
//!
//! Ties the port traits from `ecopod-core` into the running appliance:
//!
//! - [`boot::BootSequencer`] - mode determination and storage preparation
//! - [`capture::CaptureSupervisor`] - the perpetual sense-and-store loop
//! - [`sync::SyncSupervisor`] - the perpetual upload loop
//! - [`connectivity::ConnectivityController`] - modem power and
//!   reachability, shared by boot and sync (never concurrently)
//! - [`storage`] - directory lifecycle (reconcile, fallback merge,
//!   log staging)
//! - [`watchdog::Watchdog`] - terminal failure handler
//!
//! The engine talks to hardware, network and sensors exclusively through
//! the ports, so every path through it is exercised by the unit tests in
//! this crate with in-memory doubles.

pub mod boot;
pub mod capture;
pub mod connectivity;
pub mod storage;
pub mod sync;
pub mod watchdog;

#[cfg(test)]
pub(crate) mod testing;
